//! Mirrors the `data` of every ConfigMirror resource into an owned ConfigMap.
//!
//! ```text
//! cargo run --example configmap_mirror -- --external --create-crd
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crd_operator::config::init_logging;
use crd_operator::prelude::*;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::Client;

const FINALIZER: &str = "demo.example.com/configmap";
const FIELD_MANAGER: &str = "configmap-mirror";

#[derive(Parser, Debug)]
#[command(about = "Mirror ConfigMirror resources into ConfigMaps")]
struct Cli {
    #[command(flatten)]
    operator: OperatorArgs,
}

fn config_mirror_kind() -> ResourceKind {
    ResourceKind::new(
        "demo.example.com",
        "v1alpha1",
        "ConfigMirror",
        "configmirrors",
        "configmirror",
    )
    .with_short_name("cmir")
}

#[derive(Deserialize, Debug, Default)]
struct ConfigMirrorSpec {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

struct MirrorFactory {
    client: Client,
}

impl HandlerFactory for MirrorFactory {
    type Handler = MirrorHandler;

    fn build(
        &self,
        resource: &CustomResource,
        _api: Arc<dyn ClusterApi>,
    ) -> anyhow::Result<MirrorHandler> {
        let spec: ConfigMirrorSpec =
            serde_json::from_value(resource.spec.clone()).context("spec.data must map strings")?;
        let namespace = resource
            .namespace()
            .context("ConfigMirror must be namespaced")?
            .to_string();

        Ok(MirrorHandler {
            config_maps: Api::namespaced(self.client.clone(), &namespace),
            spec,
        })
    }
}

struct MirrorHandler {
    config_maps: Api<ConfigMap>,
    spec: ConfigMirrorSpec,
}

impl MirrorHandler {
    async fn apply(&self, resource: &StatusStore) -> anyhow::Result<()> {
        let name = resource.resource().name();
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                owner_references: Some(vec![resource.owner_reference()?]),
                ..Default::default()
            },
            data: Some(self.spec.data.clone()),
            ..Default::default()
        };

        self.config_maps
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&config_map),
            )
            .await
            .with_context(|| format!("Failed to apply ConfigMap {}", name))?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> anyhow::Result<()> {
        match self.config_maps.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                log::debug!("ConfigMap {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete ConfigMap {}", name)),
        }
    }
}

#[async_trait]
impl ResourceHandler for MirrorHandler {
    async fn create(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        resource.add_finalizer(FINALIZER).await?;
        self.apply(resource).await?;
        log::info!(
            "Mirrored {} keys for {}",
            self.spec.data.len(),
            resource.resource().display_name()
        );
        Ok(())
    }

    async fn modify(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        if resource.resource().is_being_deleted() {
            self.remove(resource.resource().name()).await?;
            resource.remove_finalizer(FINALIZER).await?;
            return Ok(());
        }

        if resource.status().is_new() {
            // create has not recorded a state yet, ADDED will handle it
            return Ok(());
        }

        self.apply(resource).await?;
        resource
            .set_status(serde_json::json!({ "keys": self.spec.data.len() }))
            .await?;
        Ok(())
    }

    async fn delete(&mut self, resource: &mut StatusStore) -> anyhow::Result<()> {
        self.remove(resource.resource().name()).await
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.operator.log_level);

    let kind = config_mirror_kind();
    if cli.operator.print_crd {
        print!("{}", kind.crd_yaml()?);
        return Ok(());
    }

    let config = OperatorConfig::try_from(&cli.operator)?;
    let cluster = KubeCluster::connect(config.external).await?;
    let factory = MirrorFactory {
        client: cluster.client().clone(),
    };

    Operator::new(kind, factory)
        .run_with(Arc::new(cluster), &config, Shutdown::on_ctrl_c())
        .await?;
    Ok(())
}
