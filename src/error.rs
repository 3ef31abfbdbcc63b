use std::fmt::Write;
use thiserror::Error;

/// Formats an error and its entire source chain with each error on a new line
///
/// This produces output like:
/// ```text
/// Error message
///   Caused by: First cause
///   Caused by: Root cause
/// ```
pub fn format_error_chain(err: &dyn std::error::Error) -> String {
    let mut output = String::new();
    write!(&mut output, "{}", err).ok();

    let mut source = err.source();
    while let Some(err) = source {
        write!(&mut output, "\n  Caused by: {}", err).ok();
        source = err.source();
    }

    output
}

/// Formats an anyhow::Error with its full chain
pub fn format_anyhow_chain(err: &anyhow::Error) -> String {
    let mut output = String::new();

    let chain: Vec<_> = err.chain().collect();

    if let Some((first, rest)) = chain.split_first() {
        write!(&mut output, "{}", first).ok();
        for cause in rest {
            write!(&mut output, "\n  Caused by: {}", cause).ok();
        }
    }

    output
}

/// Failure reported by the cluster API seam.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The API server answered with a non-success status
    #[error("API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Transport or client-side failure
    #[error("Kubernetes client error")]
    Kube(#[source] kube::Error),
}

impl ClusterError {
    pub fn api(code: u16, reason: &str, message: &str) -> Self {
        ClusterError::Api {
            code,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Api { code: 404, .. })
    }

    /// The apiextensions server (and some clients) report a validation error on
    /// `status.conditions` when creating a CRD, even though the object was stored.
    pub fn is_null_conditions_defect(&self) -> bool {
        let message = match self {
            ClusterError::Api { code: 422, message, .. } => message,
            ClusterError::Decode(message) => message,
            _ => return false,
        };
        let message = message.to_lowercase();
        message.contains("conditions")
            && (message.contains("must not be null") || message.contains("must not be `none`"))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => ClusterError::Api {
                code: resp.code,
                reason: resp.reason,
                message: resp.message,
            },
            kube::Error::SerdeError(e) => ClusterError::Decode(e.to_string()),
            other => ClusterError::Kube(other),
        }
    }
}

/// Which handler operation an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for HandlerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerAction::Create => write!(f, "create"),
            HandlerAction::Modify => write!(f, "modify"),
            HandlerAction::Delete => write!(f, "delete"),
        }
    }
}

/// Central operator error type
#[derive(Error, Debug)]
pub enum OperatorError {
    /// The incoming resource is missing required content
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// Cluster API errors (transport, non-404 reads, patches)
    #[error("Cluster API request failed")]
    Cluster(#[from] ClusterError),

    /// A resource handler failed on the modify or delete path
    #[error("Handler {action} failed: {cause:#}")]
    Handler {
        action: HandlerAction,
        cause: anyhow::Error,
    },

    /// The CRD could not be registered at startup
    #[error("CRD bootstrap error")]
    CrdBootstrap(#[source] ClusterError),

    #[error("Kubernetes config error: {0}")]
    KubernetesConfig(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/Deserialization errors
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    #[error("YAML error")]
    Yaml(#[from] serde_yaml::Error),
}

/// Convenience type alias for Results using OperatorError
pub type OperatorResult<T> = Result<T, OperatorError>;

impl From<kube::Error> for OperatorError {
    fn from(e: kube::Error) -> Self {
        OperatorError::Cluster(e.into())
    }
}

impl OperatorError {
    pub fn handler(action: HandlerAction, cause: anyhow::Error) -> Self {
        OperatorError::Handler { action, cause }
    }

    pub fn is_invalid_spec(&self) -> bool {
        matches!(self, OperatorError::InvalidSpec(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn not_found_only_matches_404() {
        assert!(ClusterError::api(404, "NotFound", "gone").is_not_found());
        assert!(!ClusterError::api(409, "Conflict", "exists").is_not_found());
        assert!(!ClusterError::Decode("bad".to_string()).is_not_found());
    }

    #[test]
    fn conditions_defect_is_recognised() {
        let api = ClusterError::api(
            422,
            "Invalid",
            "CustomResourceDefinition is invalid: status.conditions: must not be null",
        );
        assert!(api.is_null_conditions_defect());

        let decode = ClusterError::Decode("Invalid value for `conditions`, must not be `None`".into());
        assert!(decode.is_null_conditions_defect());
    }

    #[test]
    fn other_creation_failures_are_not_the_defect() {
        assert!(!ClusterError::api(422, "Invalid", "spec.group: Required value")
            .is_null_conditions_defect());
        assert!(!ClusterError::api(500, "InternalError", "conditions must not be null")
            .is_null_conditions_defect());
        assert!(!ClusterError::api(403, "Forbidden", "forbidden").is_null_conditions_defect());
    }

    #[test]
    fn error_chain_lists_causes() {
        let err = OperatorError::CrdBootstrap(ClusterError::api(403, "Forbidden", "nope"));
        let formatted = format_error_chain(&err);
        assert!(formatted.starts_with("CRD bootstrap error"));
        assert!(formatted.contains("\n  Caused by: API error 403 (Forbidden): nope"));
    }

    #[test]
    fn wrapped_cluster_errors_appear_once_in_the_chain() {
        let bootstrap = OperatorError::CrdBootstrap(ClusterError::api(403, "Forbidden", "nope"));
        assert_eq!(
            format_error_chain(&bootstrap),
            "CRD bootstrap error\n  Caused by: API error 403 (Forbidden): nope"
        );

        let cluster = OperatorError::from(ClusterError::api(404, "NotFound", "gone"));
        assert_eq!(
            format_error_chain(&cluster),
            "Cluster API request failed\n  Caused by: API error 404 (NotFound): gone"
        );
    }

    #[test]
    fn anyhow_chain_lists_context() {
        let err = anyhow::anyhow!("connection refused").context("db unavailable");
        assert_eq!(
            format_anyhow_chain(&err),
            "db unavailable\n  Caused by: connection refused"
        );
    }
}
