//! SSH transport built on russh.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: inactivity timeout, keepalive, and
//!    compression preference.
//! 2. **Connection Establishment**: TCP dial bounded by the connect timeout.
//! 3. **Authentication**: password authentication with the record's
//!    credentials. Server host keys are accepted without verification
//!    (see [`SshClientHandler`]).
//! 4. **Command Execution**: every command runs on a fresh session channel;
//!    stdout and stderr are merged in arrival order.
//! 5. **Close**: graceful disconnect, idempotent.
//!
//! ## Retry Strategy
//!
//! Dial attempts use exponential backoff with jitter via the `backon` crate,
//! capped at [`MAX_RETRY_DELAY`]. The default is a single attempt; retries
//! are enabled with `SSH_MAX_RETRIES`. Authentication failures are never
//! retried to avoid account lockouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, Disconnect, client};
use tracing::{debug, error, info, warn};

use crate::mcp::config::{MAX_RETRY_DELAY, SessionConfig};
use crate::mcp::error::{HostError, is_retryable_error};
use crate::mcp::session::{Connector, RemoteSession, SshClientHandler};
use crate::mcp::types::HostRecord;

type SshHandle = client::Handle<SshClientHandler>;

/// Build russh client configuration.
///
/// - Inactivity timeout set to `inactivity_timeout`
/// - Keepalive interval of 30 seconds with max 3 keepalives
/// - ZLIB preferred when `compress` is set, otherwise no compression
pub(crate) fn build_client_config(inactivity_timeout: Duration, compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: Some(inactivity_timeout),
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// [`Connector`] that opens real SSH sessions.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SessionConfig,
}

impl SshConnector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, record: &HostRecord) -> Result<Box<dyn RemoteSession>, HostError> {
        if !record.is_connectable() {
            return Err(HostError::connection(
                &record.name,
                "host record is missing host, port, user or password",
            ));
        }

        let handle = connect_with_retry(record, &self.config)
            .await
            .map_err(|e| HostError::connection(&record.name, e))?;

        Ok(Box::new(SshSession {
            host: record.name.clone(),
            handle: Some(handle),
            command_timeout: self.config.command_timeout,
        }))
    }
}

/// Dial with exponential backoff. Only transient errors are retried.
async fn connect_with_retry(record: &HostRecord, config: &SessionConfig) -> Result<SshHandle, String> {
    let attempt_counter = AtomicU32::new(0);
    let address = record.address();

    let backoff = ExponentialBuilder::default()
        .with_min_delay(config.retry_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(config.max_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);
        if current_attempt > 0 {
            warn!(
                "SSH connection retry attempt {} to {}@{}",
                current_attempt, record.user, address
            );
        }
        connect_to_ssh(record, config).await
    })
    .retry(backoff)
    .when(|e| {
        let retryable = is_retryable_error(e);
        if !retryable {
            debug!(
                "SSH connection to {}@{} failed with non-retryable error: {}",
                record.user, address, e
            );
        }
        retryable
    })
    .notify(|err, dur| {
        warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
    })
    .await;

    let total_attempts = attempt_counter.load(Ordering::SeqCst);
    match result {
        Ok(handle) => {
            if total_attempts > 1 {
                info!(
                    "SSH connection to {}@{} succeeded after {} attempt(s)",
                    record.user, address, total_attempts
                );
            }
            Ok(handle)
        }
        Err(e) if total_attempts > 1 => {
            error!(
                "SSH connection to {}@{} failed after {} attempt(s). Last error: {}",
                record.user, address, total_attempts, e
            );
            Err(format!("{} (after {} attempts)", e, total_attempts))
        }
        Err(e) => Err(e),
    }
}

/// Establish one SSH connection and authenticate with the record's password.
async fn connect_to_ssh(record: &HostRecord, config: &SessionConfig) -> Result<SshHandle, String> {
    let client_config = build_client_config(config.command_timeout, config.compress);

    let connect_future = client::connect(
        client_config,
        (record.host.as_str(), record.port),
        SshClientHandler,
    );

    let mut handle = tokio::time::timeout(config.connect_timeout, connect_future)
        .await
        .map_err(|_| format!("Connection timed out after {:?}", config.connect_timeout))?
        .map_err(|e| format!("Failed to connect: {}", e))?;

    let auth = handle
        .authenticate_password(record.user.as_str(), record.pass.as_str())
        .await
        .map_err(|e| format!("Password authentication failed: {}", e))?;

    if !auth.success() {
        return Err(format!(
            "Authentication failed: password rejected for user {}",
            record.user
        ));
    }

    Ok(handle)
}

/// Live SSH connection bound to one host record.
pub struct SshSession {
    host: String,
    handle: Option<SshHandle>,
    command_timeout: Duration,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, HostError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| HostError::execution(&self.host, "session is closed"))?;

        let output = execute_ssh_command(handle, command, self.command_timeout)
            .await
            .map_err(|e| HostError::execution(&self.host, e))?;

        match output.exit_status {
            Some(0) => Ok(output.data),
            Some(status) => {
                debug!(
                    "Discarding {} byte(s) of output from failed command on {}",
                    output.data.len(),
                    self.host
                );
                Err(HostError::execution(
                    &self.host,
                    format!("process exited with status {}", status),
                ))
            }
            None => Err(HostError::execution(
                &self.host,
                "remote command exited without exit status",
            )),
        }
    }

    async fn close(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await
        {
            warn!("Error during disconnect from {}: {}", self.host, e);
        }
    }
}

/// Merged output and exit status of one remote command.
#[derive(Debug, Default)]
struct CommandOutput {
    data: Vec<u8>,
    exit_status: Option<u32>,
}

/// Run one command on a fresh channel, collecting merged stdout/stderr.
async fn execute_ssh_command(
    handle: &SshHandle,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, String> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| format!("Failed to open channel: {}", e))?;

    channel
        .exec(true, command)
        .await
        .map_err(|e| format!("Failed to execute command: {}", e))?;

    let mut output = CommandOutput {
        data: Vec::with_capacity(4096),
        exit_status: None,
    };

    let result = tokio::time::timeout(timeout, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    output.data.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    // ext == 1 is stderr in SSH protocol
                    if ext == 1 {
                        output.data.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    output.exit_status = Some(exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    // Continue to wait for exit status if not received yet
                    if output.exit_status.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;

    let _ = channel.close().await;

    if result.is_err() {
        return Err(format!("Command timed out after {:?}", timeout));
    }
    Ok(output)
}
