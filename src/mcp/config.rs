//! Configuration resolution for the SSH fleet server.
//!
//! This module handles configuration values with a three-tier priority system:
//!
//! 1. **Parameter** - Explicitly provided value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_FLEET_STORE` | `~/.ssh-fleet/hosts.yaml` | Host registry file |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection timeout in seconds |
//! | `SSH_COMMAND_TIMEOUT` | 180s | Command execution timeout in seconds |
//! | `SSH_MAX_RETRIES` | 0 | Retry attempts for transient dial failures |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `SSH_FLEET_MAX_CONCURRENCY` | unset | Cap on hosts dispatched at once |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default SSH command execution timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 180;

/// Default retry attempts for a failed dial (one attempt, no retries)
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Maximum retry delay cap
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Registry file name inside the default directory
pub(crate) const DEFAULT_STORE_DIR: &str = ".ssh-fleet";
pub(crate) const DEFAULT_STORE_FILE: &str = "hosts.yaml";

pub(crate) const STORE_PATH_ENV_VAR: &str = "SSH_FLEET_STORE";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";
pub(crate) const MAX_CONCURRENCY_ENV_VAR: &str = "SSH_FLEET_MAX_CONCURRENCY";

/// Transport settings applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub compress: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            compress: true,
        }
    }
}

/// Settings resolved once at startup and handed to the composition root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub store_path: PathBuf,
    pub session: SessionConfig,
    /// `None` dispatches every host at once.
    pub max_concurrency: Option<usize>,
}

impl FleetConfig {
    /// Resolve every setting from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            store_path: resolve_store_path(None),
            session: SessionConfig {
                connect_timeout: resolve_connect_timeout(None),
                command_timeout: resolve_command_timeout(None),
                max_retries: resolve_max_retries(None),
                retry_delay: resolve_retry_delay(None),
                compress: resolve_compression(None),
            },
            max_concurrency: resolve_max_concurrency(None),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Resolve the registry path with priority: parameter -> env var -> `~/.ssh-fleet/hosts.yaml`
pub(crate) fn resolve_store_path(path_param: Option<PathBuf>) -> PathBuf {
    if let Some(path) = path_param {
        return path;
    }

    if let Ok(env_path) = env::var(STORE_PATH_ENV_VAR)
        && !env_path.trim().is_empty()
    {
        return PathBuf::from(env_path.trim());
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_DIR)
        .join(DEFAULT_STORE_FILE)
}

/// Resolve the connection timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> Duration {
    let secs = timeout_param
        .or_else(|| env_parse(CONNECT_TIMEOUT_ENV_VAR))
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve the command execution timeout with priority: parameter -> env var -> default
pub(crate) fn resolve_command_timeout(timeout_param: Option<u64>) -> Duration {
    let secs = timeout_param
        .or_else(|| env_parse(COMMAND_TIMEOUT_ENV_VAR))
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve the max retries value with priority: parameter -> env var -> default
pub(crate) fn resolve_max_retries(max_retries_param: Option<u32>) -> u32 {
    max_retries_param
        .or_else(|| env_parse(MAX_RETRIES_ENV_VAR))
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Resolve the retry delay with priority: parameter -> env var -> default
pub(crate) fn resolve_retry_delay(retry_delay_param: Option<u64>) -> Duration {
    let ms = retry_delay_param
        .or_else(|| env_parse(RETRY_DELAY_MS_ENV_VAR))
        .unwrap_or(DEFAULT_RETRY_DELAY_MS);
    Duration::from_millis(ms)
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub(crate) fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolve the dispatch concurrency cap; zero or unset means unbounded.
pub(crate) fn resolve_max_concurrency(cap_param: Option<usize>) -> Option<usize> {
    cap_param
        .or_else(|| env_parse(MAX_CONCURRENCY_ENV_VAR))
        .filter(|cap| *cap > 0)
}
