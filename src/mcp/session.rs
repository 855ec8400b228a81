//! Session abstractions and the russh client handler.
//!
//! # Architecture
//!
//! - [`Connector`]: opens a [`RemoteSession`] for a [`HostRecord`]. The
//!   dispatcher only talks to this trait, so tests drive it with a fake
//!   transport instead of a network.
//! - [`RemoteSession`]: one live connection. Each [`RemoteSession::exec`]
//!   opens an independent channel over the same transport.
//! - [`SshClientHandler`]: a russh client handler that accepts all host keys
//!   (similar to `StrictHostKeyChecking=no` in OpenSSH).
//!
//! Sessions are never pooled: one is opened per host per dispatch and closed
//! when the task ends, whatever its outcome.

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use crate::mcp::error::HostError;
use crate::mcp::types::HostRecord;

/// One live connection to a single remote host.
#[async_trait]
pub trait RemoteSession: Send {
    /// Run `command` to completion and return its merged stdout/stderr.
    ///
    /// A non-zero exit status is an [`HostError::Execution`]. Output produced
    /// before the failure is not returned.
    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, HostError>;

    /// Release the transport. Safe to call more than once.
    async fn close(&mut self);
}

/// Opens sessions for host records.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Dial and authenticate. Network and authentication failures are
    /// reported as [`HostError::Connection`].
    async fn connect(&self, record: &HostRecord) -> Result<Box<dyn RemoteSession>, HostError>;
}

/// Client handler for russh that accepts all host keys.
///
/// # Security Note
///
/// The remote host's identity is never verified, so connections are open to
/// man-in-the-middle attacks. Host-key pinning against a known_hosts file is
/// the intended replacement.
pub struct SshClientHandler;

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!("Accepting unverified server host key");
        Ok(true)
    }
}
