//! Event-driven reconciliation for Kubernetes custom resources.
//!
//! A [`WatchLoop`](kubernetes::WatchLoop) watches one resource kind and hands
//! every event to a [`Reconciler`](kubernetes::Reconciler), which calls the
//! integrator's [`ResourceHandler`](kubernetes::ResourceHandler) and records
//! the outcome in the resource status.

pub mod prelude {
    pub use crate::config::{LogLevel, OperatorArgs, OperatorConfig, ScopeArg};
    pub use crate::error::{ClusterError, HandlerAction, OperatorError, OperatorResult};
    pub use crate::kubernetes::*;
    pub use crate::operator::Operator;

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}

pub mod config;
pub mod error;
pub mod kubernetes;
pub mod operator;
