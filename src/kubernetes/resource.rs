use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{OperatorError, OperatorResult};

pub const STATE_PROCESSED: &str = "processed";
pub const STATE_ERROR: &str = "error";

/// Value of `status.state`.
/// `processed` and `error` are written by the reconciler, anything else is kind-defined.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceState {
    Processed,
    Error,
    Custom(String),
}

impl From<String> for ResourceState {
    fn from(value: String) -> Self {
        match value.as_str() {
            STATE_PROCESSED => ResourceState::Processed,
            STATE_ERROR => ResourceState::Error,
            _ => ResourceState::Custom(value),
        }
    }
}

impl From<ResourceState> for String {
    fn from(value: ResourceState) -> Self {
        match value {
            ResourceState::Processed => STATE_PROCESSED.to_string(),
            ResourceState::Error => STATE_ERROR.to_string(),
            ResourceState::Custom(s) => s,
        }
    }
}

/// Observed state recorded on the resource
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ResourceState>,

    /// Message of the failure that put the resource in the error state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Any other status fields owned by the resource kind
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,

    /// `state` key was present, even if null
    #[serde(skip)]
    state_recorded: bool,
}

impl ResourceStatus {
    /// Parses a raw `status` value. Null is an empty status.
    pub fn from_value(value: serde_json::Value) -> serde_json::Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let state_recorded = value.get("state").is_some();
        let mut status: Self = serde_json::from_value(value)?;
        status.state_recorded = state_recorded;
        Ok(status)
    }

    pub fn processed() -> Self {
        Self {
            state: Some(ResourceState::Processed),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(ResourceState::Error),
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// No `state` key has been recorded yet
    pub fn is_new(&self) -> bool {
        self.state.is_none() && !self.state_recorded
    }

    pub fn is_error(&self) -> bool {
        self.state == Some(ResourceState::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.is_new() && self.error.is_none() && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,

    #[serde(default, deserialize_with = "unique_finalizers")]
    pub finalizers: Vec<String>,
}

fn unique_finalizers<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let finalizers: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(dedup_finalizers(finalizers.unwrap_or_default()))
}

/// Drops repeated finalizers, keeping the first occurrence of each
pub fn dedup_finalizers(finalizers: Vec<String>) -> Vec<String> {
    finalizers.into_iter().unique().collect()
}

/// A custom resource as delivered by the watch stream.
/// `spec` is opaque to the framework and handed to the resource handler as-is.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub metadata: ResourceMetadata,

    pub spec: serde_json::Value,

    #[serde(default, deserialize_with = "status_or_default")]
    pub status: ResourceStatus,
}

fn status_or_default<'de, D>(deserializer: D) -> Result<ResourceStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let status = serde_json::Value::deserialize(deserializer)?;
    ResourceStatus::from_value(status).map_err(serde::de::Error::custom)
}

impl CustomResource {
    /// Builds a resource from the raw object, failing with `InvalidSpec` when
    /// `metadata` or `spec` is missing or malformed.
    pub fn from_value(value: serde_json::Value) -> OperatorResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| OperatorError::InvalidSpec("resource is not an object".to_string()))?;
        for key in ["metadata", "spec"] {
            if !object.contains_key(key) {
                return Err(OperatorError::InvalidSpec(format!(
                    "missing '{}' key in spec",
                    key
                )));
            }
        }

        serde_json::from_value(value).map_err(|e| OperatorError::InvalidSpec(e.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// `namespace/name`, or just `name` for cluster-scoped resources
    pub fn display_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name()),
            None => self.name().to_string(),
        }
    }

    /// The cluster has accepted a delete and is waiting on finalizers
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Kind of change delivered by the watch stream
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Other(String),
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ADDED" => EventType::Added,
            "MODIFIED" => EventType::Modified,
            "DELETED" => EventType::Deleted,
            _ => EventType::Other(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Added => write!(f, "ADDED"),
            EventType::Modified => write!(f, "MODIFIED"),
            EventType::Deleted => write!(f, "DELETED"),
            EventType::Other(other) => write!(f, "{}", other),
        }
    }
}

/// One frame of the watch stream. The object is kept raw so that a malformed
/// resource only fails when a reconciler is built for it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: serde_json::Value,
}

impl WatchEvent {
    pub fn new(event_type: EventType, object: serde_json::Value) -> Self {
        Self { event_type, object }
    }
}
