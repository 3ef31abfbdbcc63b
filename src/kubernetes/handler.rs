use std::sync::Arc;

use async_trait::async_trait;

use crate::kubernetes::api::ClusterApi;
use crate::kubernetes::resource::CustomResource;
use crate::kubernetes::status::StatusStore;

/// Kind-specific logic run by the reconciler.
///
/// A handler is built for every watch event and sees the resource through the
/// [`StatusStore`], which it may use to record extra status or manage
/// finalizers. Errors from `create` end up in the resource status; errors from
/// `modify` and `delete` are returned to the watch loop.
#[async_trait]
pub trait ResourceHandler: Send {
    async fn create(&mut self, resource: &mut StatusStore) -> anyhow::Result<()>;

    async fn modify(&mut self, resource: &mut StatusStore) -> anyhow::Result<()>;

    async fn delete(&mut self, resource: &mut StatusStore) -> anyhow::Result<()>;
}

/// Builds a handler for one incoming resource. Returning an error rejects the
/// resource as an invalid spec before any handler method runs.
pub trait HandlerFactory: Send + Sync {
    type Handler: ResourceHandler;

    fn build(
        &self,
        resource: &CustomResource,
        api: Arc<dyn ClusterApi>,
    ) -> anyhow::Result<Self::Handler>;
}
