use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{
        Api, DynamicObject, Patch, PatchParams, PostParams, WatchEvent as KubeWatchEvent,
        WatchParams,
    },
    client::Client,
    config::{Config, KubeConfigOptions},
};

use crate::error::{ClusterError, OperatorError, OperatorResult};
use crate::kubernetes::kind::{ResourceKind, Scope};
use crate::kubernetes::resource::{CustomResource, EventType, WatchEvent};

pub type WatchStream = BoxStream<'static, Result<WatchEvent, ClusterError>>;

/// The cluster API operations the operator relies on.
///
/// Objects travel as raw JSON so the reconciler sees exactly what the server
/// returned. Reads answer `None` for 404 instead of failing.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Opens a watch on `kind`, cluster-wide when `namespace` is `None`
    async fn watch(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, ClusterError>;

    async fn get_object(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<serde_json::Value>, ClusterError>;

    /// JSON merge patch against the main resource
    async fn patch_object(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<serde_json::Value, ClusterError>;

    /// JSON merge patch against the status subresource
    async fn patch_status(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<serde_json::Value, ClusterError>;

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>, ClusterError>;

    async fn create_crd(&self, crd: &CustomResourceDefinition) -> Result<(), ClusterError>;
}

/// Reads a single resource of `kind`, `None` if it does not exist
pub async fn get_custom_resource(
    api: &dyn ClusterApi,
    kind: &ResourceKind,
    name: &str,
    namespace: Option<&str>,
) -> OperatorResult<Option<CustomResource>> {
    match api.get_object(kind, name, namespace).await? {
        Some(object) => Ok(Some(CustomResource::from_value(object)?)),
        None => Ok(None),
    }
}

/// `ClusterApi` backed by a real API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects using the local kubeconfig when `external`, otherwise the
    /// in-cluster service account.
    pub async fn connect(external: bool) -> OperatorResult<Self> {
        let config = if external {
            Config::from_kubeconfig(&KubeConfigOptions::default())
                .await
                .map_err(|e| OperatorError::KubernetesConfig(e.to_string()))?
        } else {
            Config::incluster().map_err(|e| OperatorError::KubernetesConfig(e.to_string()))?
        };
        let client =
            Client::try_from(config).map_err(|e| OperatorError::KubernetesConfig(e.to_string()))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, kind: &ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = kind.api_resource();
        match (kind.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    fn crds(&self) -> Api<CustomResourceDefinition> {
        Api::all(self.client.clone())
    }
}

fn convert_event(
    event: kube::Result<KubeWatchEvent<DynamicObject>>,
) -> Option<Result<WatchEvent, ClusterError>> {
    let (event_type, object) = match event {
        Ok(KubeWatchEvent::Added(o)) => (EventType::Added, o),
        Ok(KubeWatchEvent::Modified(o)) => (EventType::Modified, o),
        Ok(KubeWatchEvent::Deleted(o)) => (EventType::Deleted, o),
        Ok(KubeWatchEvent::Bookmark(b)) => {
            log::debug!("Watch bookmark at resource version {}", b.metadata.resource_version);
            return None;
        }
        Ok(KubeWatchEvent::Error(resp)) => {
            return Some(Err(ClusterError::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            }))
        }
        Err(e) => return Some(Err(e.into())),
    };

    Some(
        serde_json::to_value(object)
            .map(|object| WatchEvent::new(event_type, object))
            .map_err(|e| ClusterError::Decode(e.to_string())),
    )
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn watch(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<WatchStream, ClusterError> {
        // "0" replays every existing object as ADDED before live changes
        let stream = self
            .api(kind, namespace)
            .watch(&WatchParams::default(), "0")
            .await?;

        Ok(stream
            .filter_map(|event| futures_util::future::ready(convert_event(event)))
            .boxed())
    }

    async fn get_object(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<serde_json::Value>, ClusterError> {
        match self.api(kind, namespace).get_opt(name).await? {
            Some(object) => Ok(Some(
                serde_json::to_value(object).map_err(|e| ClusterError::Decode(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn patch_object(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<serde_json::Value, ClusterError> {
        let object = self
            .api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        serde_json::to_value(object).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    async fn patch_status(
        &self,
        kind: &ResourceKind,
        name: &str,
        namespace: Option<&str>,
        patch: &serde_json::Value,
    ) -> Result<serde_json::Value, ClusterError> {
        let object = self
            .api(kind, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        serde_json::to_value(object).map_err(|e| ClusterError::Decode(e.to_string()))
    }

    async fn get_crd(&self, name: &str) -> Result<Option<CustomResourceDefinition>, ClusterError> {
        Ok(self.crds().get_opt(name).await?)
    }

    async fn create_crd(&self, crd: &CustomResourceDefinition) -> Result<(), ClusterError> {
        self.crds().create(&PostParams::default(), crd).await?;
        Ok(())
    }
}
