pub mod api;
pub mod crd;
pub mod handler;
pub mod kind;
pub mod reconciler;
pub mod resource;
pub mod status;
pub mod watch;

pub use api::{get_custom_resource, ClusterApi, KubeCluster, WatchStream};
pub use crd::{CrdBootstrapper, CrdRegistration};
pub use handler::{HandlerFactory, ResourceHandler};
pub use kind::{ResourceKind, Scope};
pub use reconciler::Reconciler;
pub use resource::{
    CustomResource, EventType, ResourceMetadata, ResourceState, ResourceStatus, WatchEvent,
};
pub use status::StatusStore;
pub use watch::{Shutdown, ShutdownTrigger, WatchLoop, WatchScope};
