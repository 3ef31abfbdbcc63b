use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::error::{OperatorError, OperatorResult};
use crate::kubernetes::WatchScope;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ScopeArg {
    Cluster,
    Namespaced,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The matching env_logger filter
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Command line flags shared by every operator. Flatten into the operator's own
/// parser to add kind-specific flags.
#[derive(Args, Clone, Debug)]
pub struct OperatorArgs {
    /// Cluster or Namespace Scoped?
    #[arg(long, value_enum, default_value = "cluster")]
    pub scope: ScopeArg,

    /// Which namespace to monitor when namespace scoped
    #[arg(long, env = "OPERATOR_NAMESPACE")]
    pub namespace: Option<String>,

    /// Create the CustomResourceDefinition on startup if missing
    #[arg(long)]
    pub create_crd: bool,

    /// Run outside of the Kubernetes Cluster using the local kubeconfig
    #[arg(long)]
    pub external: bool,

    #[arg(short = 'L', long, value_enum, default_value = "INFO")]
    pub log_level: LogLevel,

    /// Seconds to wait before reopening a closed or failed watch
    #[arg(long, default_value_t = 0)]
    pub reconnect_delay: u64,

    /// Print the CustomResourceDefinition manifest and exit
    #[arg(long)]
    pub print_crd: bool,
}

/// Validated operator settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    pub scope: WatchScope,
    pub create_crd: bool,
    pub external: bool,
    pub reconnect_delay: Duration,
}

impl TryFrom<&OperatorArgs> for OperatorConfig {
    type Error = OperatorError;

    fn try_from(args: &OperatorArgs) -> OperatorResult<Self> {
        let scope = match (args.scope, &args.namespace) {
            (ScopeArg::Namespaced, Some(ns)) if !ns.is_empty() => {
                WatchScope::Namespace(ns.clone())
            }
            (ScopeArg::Namespaced, _) => {
                return Err(OperatorError::Config(
                    "--scope namespaced requires --namespace".to_string(),
                ))
            }
            (ScopeArg::Cluster, Some(ns)) => {
                log::warn!("Ignoring namespace {} for cluster scoped watch", ns);
                WatchScope::Cluster
            }
            (ScopeArg::Cluster, None) => WatchScope::Cluster,
        };

        Ok(Self {
            scope,
            create_crd: args.create_crd,
            external: args.external,
            reconnect_delay: Duration::from_secs(args.reconnect_delay),
        })
    }
}

/// Installs env_logger. `RUST_LOG` wins over `level`; a second call is a no-op.
pub fn init_logging(level: LogLevel) {
    let env = env_logger::Env::new().default_filter_or(level.as_filter());
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialised");
    }
}
