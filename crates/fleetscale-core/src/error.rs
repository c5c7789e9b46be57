//! Error types for fleetscale.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for scaling decisions.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors raised while building a [`PolicyConfig`](crate::PolicyConfig).
///
/// All variants are startup-fatal: the daemon must not serve traffic with
/// a policy it could not read.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse environment variable {var}={value:?}: {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not read config file {}: {reason}", path.display())]
    File { path: PathBuf, reason: String },
}

/// Errors raised by the decision engine for a single request.
///
/// These never take the process down; the transport maps them to a
/// client error response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid fixedReplicas value {value:?}: {reason}")]
    InvalidFixedReplicas { value: String, reason: String },
}
