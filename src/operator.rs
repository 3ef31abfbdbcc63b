use std::sync::Arc;

use crate::config::{init_logging, OperatorArgs, OperatorConfig};
use crate::error::OperatorResult;
use crate::kubernetes::{
    ClusterApi, HandlerFactory, KubeCluster, ResourceKind, Shutdown, WatchLoop,
};

/// Entry point for an operator binary: one resource kind plus the factory that
/// builds its handlers.
pub struct Operator<F: HandlerFactory> {
    kind: ResourceKind,
    factory: F,
}

impl<F: HandlerFactory> Operator<F> {
    pub fn new(kind: ResourceKind, factory: F) -> Self {
        Self { kind, factory }
    }

    /// Sets up logging, connects to the cluster and watches until Ctrl-C
    pub async fn run(self, args: &OperatorArgs) -> OperatorResult<()> {
        init_logging(args.log_level);

        if args.print_crd {
            print!("{}", self.kind.crd_yaml()?);
            return Ok(());
        }

        let config = OperatorConfig::try_from(args)?;
        let cluster = KubeCluster::connect(config.external).await?;
        self.run_with(Arc::new(cluster), &config, Shutdown::on_ctrl_c())
            .await
    }

    /// Runs the watch loop against an already connected cluster API
    pub async fn run_with(
        self,
        api: Arc<dyn ClusterApi>,
        config: &OperatorConfig,
        shutdown: Shutdown,
    ) -> OperatorResult<()> {
        log::info!("Starting Kubernetes Operator for {}", self.kind.kind);

        WatchLoop::new(api, Arc::new(self.kind), config.scope.clone(), self.factory)
            .with_crd_bootstrap(config.create_crd)
            .with_reconnect_delay(config.reconnect_delay)
            .run(shutdown)
            .await
    }
}
