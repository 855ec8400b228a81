//! Error taxonomy for fleet operations.
//!
//! Errors fall into two scopes:
//!
//! 1. **Whole-call errors** ([`FleetError`]): resolution and persistence
//!    failures. These abort the request before (or instead of) any dispatch.
//!
//! 2. **Per-host errors** ([`HostError`]): connection, execution and
//!    cancellation failures. These are recorded in the failing host's result
//!    slot and never fail the aggregate.
//!
//! The module also classifies dial errors as transient or permanent for the
//! connection retry loop in `client`.
//!
//! # Retry Classification
//!
//! Authentication errors take precedence over connection errors. If an error
//! message contains both authentication and connection keywords, it is
//! classified as non-retryable to avoid repeatedly failing with bad credentials.
//!
//! ```rust,ignore
//! assert!(!is_retryable_error("Permission denied"));
//! assert!(is_retryable_error("Connection refused"));
//! assert!(!is_retryable_error("SSH protocol error"));
//! assert!(is_retryable_error("SSH connection timeout"));
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Reasons a connection string or a set of host names fails to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("invalid SSH connection string: not ssh scheme")]
    WrongScheme,
    #[error("invalid SSH connection string: missing user info")]
    MissingUserInfo,
    #[error("invalid SSH connection string: missing username")]
    MissingUsername,
    #[error("invalid SSH connection string: missing password")]
    MissingPassword,
    #[error("invalid SSH connection string: missing host")]
    MissingHost,
    #[error("invalid SSH connection string: invalid port {0:?}")]
    InvalidPort(String),
    #[error("no hosts provided")]
    NoHostsRequested,
    #[error("no matching hosts for: {}", .0.join(", "))]
    NoMatchingHosts(Vec<String>),
}

/// Failures reading or writing the host registry file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read storage file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to unmarshal storage file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to marshal storage data: {0}")]
    Serialize(#[source] serde_yaml::Error),
    #[error("failed to write storage file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("host record name must not be empty")]
    EmptyName,
}

/// Failure scoped to a single host's slot in an aggregated result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("failed to connect to {host}: {reason}")]
    Connection { host: String, reason: String },
    #[error("failed to execute command on {host}: {reason}")]
    Execution { host: String, reason: String },
    #[error("operation on {host} was cancelled")]
    Cancelled { host: String },
}

impl HostError {
    pub fn connection(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            reason: reason.into(),
        }
    }

    pub fn execution(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Name of the host this error belongs to.
    pub fn host(&self) -> &str {
        match self {
            Self::Connection { host, .. }
            | Self::Execution { host, .. }
            | Self::Cancelled { host } => host,
        }
    }

    /// Prefix the reason with the step that failed, keeping the variant.
    pub fn context(self, step: &str) -> Self {
        match self {
            Self::Connection { host, reason } => Self::Connection {
                host,
                reason: format!("{step}: {reason}"),
            },
            Self::Execution { host, reason } => Self::Execution {
                host,
                reason: format!("{step}: {reason}"),
            },
            cancelled @ Self::Cancelled { .. } => cancelled,
        }
    }
}

/// Whole-call failure of a fleet operation.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// A single-host operation (e.g. `add_host`) whose only host failed.
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "password authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "timed out",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
];

/// Determines if a dial error is retryable (transient) or permanent.
///
/// Authentication failures are checked first and are never retryable.
/// Unknown errors are retried unless they look like SSH protocol errors
/// that do not also mention a timeout or connect failure.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    if AUTH_ERRORS.iter().any(|auth_err| error_lower.contains(auth_err)) {
        return false;
    }

    if RETRYABLE_ERRORS
        .iter()
        .any(|retryable_err| error_lower.contains(retryable_err))
    {
        return true;
    }

    !error_lower.contains("ssh") || error_lower.contains("timeout") || error_lower.contains("connect")
}
