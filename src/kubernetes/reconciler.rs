use std::sync::Arc;

use crate::error::{format_anyhow_chain, HandlerAction, OperatorError, OperatorResult};
use crate::kubernetes::api::ClusterApi;
use crate::kubernetes::handler::{HandlerFactory, ResourceHandler};
use crate::kubernetes::kind::ResourceKind;
use crate::kubernetes::resource::{CustomResource, EventType, ResourceStatus};
use crate::kubernetes::status::StatusStore;

/// Drives one resource through create/modify/delete for a single watch event.
///
/// ADDED only calls `create` while the resource has no `status.state`; once
/// the state is `processed` or `error` (or anything kind-defined), replays of
/// ADDED after a reconnect are ignored. MODIFIED and DELETED always reach the
/// handler.
pub struct Reconciler<H> {
    store: StatusStore,
    handler: H,
}

impl<H: ResourceHandler> Reconciler<H> {
    pub fn new(store: StatusStore, handler: H) -> Self {
        Self { store, handler }
    }

    /// Builds a reconciler for the raw object of a watch event
    pub fn for_object<F>(
        object: serde_json::Value,
        kind: Arc<ResourceKind>,
        api: Arc<dyn ClusterApi>,
        factory: &F,
    ) -> OperatorResult<Self>
    where
        F: HandlerFactory<Handler = H>,
    {
        let resource = CustomResource::from_value(object)?;
        log::debug!("Instantiated {} {}", kind.kind, resource.display_name());

        let handler = factory
            .build(&resource, api.clone())
            .map_err(|e| OperatorError::InvalidSpec(format!("{:#}", e)))?;

        Ok(Self::new(StatusStore::new(resource, kind, api), handler))
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    pub fn status(&self) -> &ResourceStatus {
        self.store.status()
    }

    pub async fn ensure(&mut self, event: &EventType) -> OperatorResult<()> {
        let name = self.store.resource().display_name();
        log::debug!("Kubernetes CRD action {} on {}", event, name);

        let status = self.store.status();
        if status.is_error() {
            log::warn!("CustomResource {} is in error state: {:?}", name, status);
        }
        log::debug!(
            "CustomResource {} state: {}",
            name,
            status
                .state
                .clone()
                .map(String::from)
                .unwrap_or_default()
        );
        let is_new = status.is_new();

        match event {
            EventType::Added if is_new => self.create(&name).await,
            EventType::Added => {
                log::debug!(
                    "CustomResource {} state is present. No action taken",
                    name
                );
                Ok(())
            }
            EventType::Modified => self
                .handler
                .modify(&mut self.store)
                .await
                .map_err(|e| OperatorError::handler(HandlerAction::Modify, e)),
            EventType::Deleted => self
                .handler
                .delete(&mut self.store)
                .await
                .map_err(|e| OperatorError::handler(HandlerAction::Delete, e)),
            EventType::Other(other) => {
                log::warn!("Unknown Kubernetes CRD event {}. Ignoring", other);
                Ok(())
            }
        }
    }

    /// Runs `create` and records the outcome. A handler failure is stored in the
    /// status and not returned; only the status patch itself can fail here.
    async fn create(&mut self, name: &str) -> OperatorResult<()> {
        let outcome = match self.handler.create(&mut self.store).await {
            Ok(()) => {
                log::info!("CustomResource {} processed", name);
                ResourceStatus::processed()
            }
            Err(e) => {
                log::warn!(
                    "Setting state 'error' on {} due to exception:\n{}",
                    name,
                    format_anyhow_chain(&e)
                );
                ResourceStatus::failed(e.to_string())
            }
        };

        self.store.record_status(&outcome).await
    }
}
