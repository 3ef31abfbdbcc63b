use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;

use crate::error::{format_error_chain, OperatorError, OperatorResult};
use crate::kubernetes::api::ClusterApi;
use crate::kubernetes::crd::CrdBootstrapper;
use crate::kubernetes::handler::HandlerFactory;
use crate::kubernetes::kind::ResourceKind;
use crate::kubernetes::reconciler::Reconciler;
use crate::kubernetes::resource::WatchEvent;

/// Which resources the loop watches
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchScope {
    Cluster,
    Namespace(String),
}

impl WatchScope {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            WatchScope::Cluster => None,
            WatchScope::Namespace(ns) => Some(ns),
        }
    }
}

impl std::fmt::Display for WatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchScope::Cluster => write!(f, "cluster"),
            WatchScope::Namespace(ns) => write!(f, "namespace {}", ns),
        }
    }
}

/// Sending half of a [`Shutdown`] signal
#[derive(Clone)]
pub struct ShutdownTrigger(Arc<watch::Sender<bool>>);

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

/// Interrupt signal observed by the watch loop between events
#[derive(Clone)]
pub struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger(Arc::new(tx)), Shutdown(rx))
    }

    /// Triggers on the first Ctrl-C
    pub fn on_ctrl_c() -> Shutdown {
        let (trigger, shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Keyboard Interrupt Triggered. Exiting...."),
                Err(e) => {
                    log::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
            }
            trigger.trigger();
        });
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the signal fires. Never resolves if every trigger is dropped.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|triggered| *triggered).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Why a single watch connection ended
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Closed,
    Shutdown,
}

/// Keeps a watch open on one resource kind and reconciles every event.
///
/// Events are handled one at a time in delivery order. A failed stream or a
/// failed modify/delete handler reopens the watch; the in-flight event is not
/// retried. Resources that fail validation are logged and skipped without
/// dropping the connection.
pub struct WatchLoop<F: HandlerFactory> {
    api: Arc<dyn ClusterApi>,
    kind: Arc<ResourceKind>,
    scope: WatchScope,
    factory: F,
    create_crd: bool,
    reconnect_delay: Duration,
}

impl<F: HandlerFactory> WatchLoop<F> {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        kind: Arc<ResourceKind>,
        scope: WatchScope,
        factory: F,
    ) -> Self {
        Self {
            api,
            kind,
            scope,
            factory,
            create_crd: false,
            reconnect_delay: Duration::ZERO,
        }
    }

    /// Register the CRD before the first watch
    pub fn with_crd_bootstrap(mut self, create_crd: bool) -> Self {
        self.create_crd = create_crd;
        self
    }

    /// Fixed pause between reconnects, zero by default
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Runs until `shutdown` fires. Only a failed CRD bootstrap is returned as
    /// an error; everything else is logged and followed by a reconnect.
    pub async fn run(&self, mut shutdown: Shutdown) -> OperatorResult<()> {
        if self.create_crd {
            CrdBootstrapper::new(self.api.clone(), self.kind.clone())
                .ensure_registered()
                .await?;
        }

        log::info!(
            "Watching Kubernetes API ({}) for new {} Resources",
            self.scope,
            self.kind.kind
        );

        while !shutdown.is_triggered() {
            match self.watch_once(&mut shutdown).await {
                Ok(StreamEnd::Shutdown) => break,
                Ok(StreamEnd::Closed) => {
                    log::info!("Watch stream for {} closed, reconnecting", self.kind.kind);
                }
                Err(e) => {
                    log::error!(
                        "Unhandled error while watching {}: {}",
                        self.kind.kind,
                        format_error_chain(&e)
                    );
                }
            }

            if !self.reconnect_delay.is_zero() {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(self.reconnect_delay) => {}
                }
            }
        }

        log::info!("Stopped watching {} Resources", self.kind.kind);
        Ok(())
    }

    async fn watch_once(&self, shutdown: &mut Shutdown) -> OperatorResult<StreamEnd> {
        let mut stream = self.api.watch(&self.kind, self.scope.namespace()).await?;
        log::debug!("Watch stream for {} opened", self.kind.kind);

        loop {
            // Only the stream read is raced against shutdown, never a reconcile
            let next = tokio::select! {
                biased;
                _ = shutdown.wait() => return Ok(StreamEnd::Shutdown),
                next = stream.next() => next,
            };

            let event = match next {
                Some(event) => event?,
                None => return Ok(StreamEnd::Closed),
            };

            match self.handle_event(event).await {
                Ok(()) => {}
                Err(e @ OperatorError::InvalidSpec(_)) => {
                    log::error!("Skipping {} event: {}", self.kind.kind, e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn handle_event(&self, event: WatchEvent) -> OperatorResult<()> {
        let mut reconciler = Reconciler::for_object(
            event.object,
            self.kind.clone(),
            self.api.clone(),
            &self.factory,
        )?;
        reconciler.ensure(&event.event_type).await
    }
}
