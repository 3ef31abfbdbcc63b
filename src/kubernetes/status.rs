use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::json;

use crate::error::{OperatorError, OperatorResult};
use crate::kubernetes::api::ClusterApi;
use crate::kubernetes::kind::{ResourceKind, Scope};
use crate::kubernetes::resource::{dedup_finalizers, CustomResource, ResourceStatus};

/// Holds the resource being reconciled and keeps its status and finalizers in
/// sync with the cluster.
///
/// Finalizer updates are a read-modify-write against the API server and are not
/// atomic: a concurrent writer between the read and the patch can lose an
/// update. Only one event is processed at a time, and running several replicas
/// against the same resources needs leader election.
pub struct StatusStore {
    resource: CustomResource,
    kind: Arc<ResourceKind>,
    api: Arc<dyn ClusterApi>,
}

impl StatusStore {
    pub fn new(
        resource: CustomResource,
        kind: Arc<ResourceKind>,
        api: Arc<dyn ClusterApi>,
    ) -> Self {
        Self {
            resource,
            kind,
            api,
        }
    }

    pub fn resource(&self) -> &CustomResource {
        &self.resource
    }

    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub fn api(&self) -> Arc<dyn ClusterApi> {
        self.api.clone()
    }

    /// Namespace used to address the resource, `None` for cluster-scoped kinds
    fn address_namespace(&self) -> OperatorResult<Option<&str>> {
        match self.kind.scope {
            Scope::Cluster => Ok(None),
            Scope::Namespaced => self.resource.namespace().map(Some).ok_or_else(|| {
                OperatorError::InvalidSpec(format!(
                    "namespaced resource {} missing metadata.namespace",
                    self.resource.name()
                ))
            }),
        }
    }

    /// Last status returned by the server, empty when none was recorded
    pub fn status(&self) -> &ResourceStatus {
        &self.resource.status
    }

    /// Patches the status subresource. `value` is wrapped as `{status: value}`
    /// unless it already has a `status` key. The local copy is replaced with the
    /// status the server returned.
    pub async fn set_status(&mut self, value: serde_json::Value) -> OperatorResult<()> {
        let patch = if value.get("status").is_some() {
            value
        } else {
            json!({ "status": value })
        };

        let namespace = self.address_namespace()?;
        log::debug!(
            "Patching status of {} {}: {}",
            self.kind.kind,
            self.resource.display_name(),
            patch
        );
        let updated = self
            .api
            .patch_status(&self.kind, self.resource.name(), namespace, &patch)
            .await?;

        let status = match updated.get("status") {
            Some(status) => ResourceStatus::from_value(status.clone())?,
            None => ResourceStatus::default(),
        };
        self.refresh_version(&updated);
        self.resource.status = status;

        Ok(())
    }

    /// Takes the resource version from an object the server returned
    fn refresh_version(&mut self, updated: &serde_json::Value) {
        if let Some(version) = updated
            .pointer("/metadata/resourceVersion")
            .and_then(|v| v.as_str())
        {
            self.resource.metadata.resource_version = Some(version.to_string());
        }
    }

    /// Typed variant of [`StatusStore::set_status`]
    pub async fn record_status(&mut self, status: &ResourceStatus) -> OperatorResult<()> {
        self.set_status(serde_json::to_value(status)?).await
    }

    /// Current finalizers as stored on the server (not the cached copy).
    /// Empty when the resource or the field is absent.
    pub async fn finalizers(&self) -> OperatorResult<Vec<String>> {
        let namespace = self.address_namespace()?;
        let object = self
            .api
            .get_object(&self.kind, self.resource.name(), namespace)
            .await?;

        let finalizers = object
            .as_ref()
            .and_then(|o| o.pointer("/metadata/finalizers"))
            .and_then(|f| f.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(dedup_finalizers(finalizers))
    }

    pub async fn set_finalizers(&mut self, finalizers: Vec<String>) -> OperatorResult<()> {
        let finalizers = dedup_finalizers(finalizers);
        let namespace = self.address_namespace()?;
        let patch = json!({ "metadata": { "finalizers": finalizers } });

        log::debug!(
            "Setting finalizers of {} {} to {:?}",
            self.kind.kind,
            self.resource.display_name(),
            finalizers
        );
        let updated = self
            .api
            .patch_object(&self.kind, self.resource.name(), namespace, &patch)
            .await?;
        self.refresh_version(&updated);
        self.resource.metadata.finalizers = finalizers;

        Ok(())
    }

    /// Adds `finalizer` if the server copy does not have it yet
    pub async fn add_finalizer(&mut self, finalizer: &str) -> OperatorResult<()> {
        let mut finalizers = self.finalizers().await?;
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.set_finalizers(finalizers).await
    }

    /// Removes `finalizer` if the server copy has it
    pub async fn remove_finalizer(&mut self, finalizer: &str) -> OperatorResult<()> {
        let mut finalizers = self.finalizers().await?;
        let before = finalizers.len();
        finalizers.retain(|f| f != finalizer);
        if finalizers.len() == before {
            return Ok(());
        }
        self.set_finalizers(finalizers).await
    }

    /// Returns the owner reference to be applied to child resources
    pub fn owner_reference(&self) -> OperatorResult<OwnerReference> {
        let uid = self.resource.metadata.uid.clone().ok_or_else(|| {
            OperatorError::InvalidSpec(format!(
                "resource {} has no metadata.uid",
                self.resource.display_name()
            ))
        })?;

        Ok(OwnerReference {
            api_version: self.kind.api_version(),
            kind: self.kind.kind.clone(),
            name: self.resource.name().to_string(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    /// Body for a child object of the same kind
    pub fn child_body(
        &self,
        name: &str,
        namespace: Option<&str>,
        spec: serde_json::Value,
        owners: &[OwnerReference],
    ) -> OperatorResult<serde_json::Value> {
        let mut body = json!({
            "apiVersion": self.kind.api_version(),
            "kind": self.kind.kind,
            "metadata": {
                "name": name,
            },
            "spec": spec,
        });
        if let Some(ns) = namespace {
            body["metadata"]["namespace"] = json!(ns);
        }
        if !owners.is_empty() {
            body["metadata"]["ownerReferences"] = serde_json::to_value(owners)?;
        }
        Ok(body)
    }
}
