//! Tasks the fleet runs on remote hosts.
//!
//! Each task is a [`HostTask`] and runs on an already-open session. Tasks
//! with several steps check the cancellation token between steps so a
//! cancelled dispatch does not start new remote commands.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::mcp::dispatch::{HostTask, TaskResult};
use crate::mcp::error::HostError;
use crate::mcp::session::RemoteSession;
use crate::mcp::types::{HostRecord, OsInfo};

pub(crate) const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";
pub(crate) const ARCH_COMMAND: &str = "uname -m";
pub(crate) const APT_UPDATE_COMMAND: &str = "apt-get update";
pub(crate) const SUDO_APT_UPDATE_COMMAND: &str = "sudo apt-get update";
pub(crate) const APT_LIST_UPGRADABLE_COMMAND: &str = "apt list --upgradable";
pub(crate) const SUDO_APT_UPGRADE_COMMAND: &str = "sudo apt-get upgrade -y";

fn ensure_not_cancelled(host: &HostRecord, cancel: &CancellationToken) -> TaskResult<()> {
    if cancel.is_cancelled() {
        return Err(HostError::Cancelled {
            host: host.name.clone(),
        });
    }
    Ok(())
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Runs one arbitrary shell command.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub command: String,
}

#[async_trait]
impl HostTask for RunCommand {
    type Output = String;

    async fn run(
        &self,
        _host: &HostRecord,
        session: &mut dyn RemoteSession,
        _cancel: &CancellationToken,
    ) -> TaskResult<String> {
        session.exec(&self.command).await.map(lossy)
    }
}

/// Refreshes package indexes and lists upgradable packages.
///
/// The index refresh runs unprivileged first and falls back to `sudo`. A
/// refresh that fails both ways is not fatal: the listing still reflects the
/// last successful refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckForUpdates;

#[async_trait]
impl HostTask for CheckForUpdates {
    type Output = String;

    async fn run(
        &self,
        host: &HostRecord,
        session: &mut dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> TaskResult<String> {
        if let Err(e) = session.exec(APT_UPDATE_COMMAND).await {
            debug!("Unprivileged index refresh on {} failed: {}", host.name, e);
            ensure_not_cancelled(host, cancel)?;
            if let Err(e) = session.exec(SUDO_APT_UPDATE_COMMAND).await {
                debug!("Index refresh with sudo on {} failed: {}", host.name, e);
            }
        }
        ensure_not_cancelled(host, cancel)?;

        session
            .exec(APT_LIST_UPGRADABLE_COMMAND)
            .await
            .map(lossy)
            .map_err(|e| e.context("failed to list upgradable packages"))
    }
}

/// Refreshes package indexes and applies all upgrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerformUpdates;

#[async_trait]
impl HostTask for PerformUpdates {
    type Output = String;

    async fn run(
        &self,
        host: &HostRecord,
        session: &mut dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> TaskResult<String> {
        session
            .exec(SUDO_APT_UPDATE_COMMAND)
            .await
            .map_err(|e| e.context("failed to update package indexes"))?;
        ensure_not_cancelled(host, cancel)?;

        session
            .exec(SUDO_APT_UPGRADE_COMMAND)
            .await
            .map(lossy)
            .map_err(|e| e.context("failed to upgrade packages"))
    }
}

/// Probes the operating system and CPU architecture.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOsInfo;

#[async_trait]
impl HostTask for CollectOsInfo {
    type Output = OsInfo;

    async fn run(
        &self,
        host: &HostRecord,
        session: &mut dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> TaskResult<OsInfo> {
        let release = session
            .exec(OS_RELEASE_COMMAND)
            .await
            .map_err(|e| e.context("failed to read /etc/os-release"))?;
        ensure_not_cancelled(host, cancel)?;

        let arch = session
            .exec(ARCH_COMMAND)
            .await
            .map_err(|e| e.context("failed to read architecture"))?;

        let mut info = parse_os_release(&lossy(release));
        info.arch = lossy(arch).trim().to_string();
        Ok(info)
    }
}

/// Map `/etc/os-release` fields onto [`OsInfo`]. `arch` is left empty.
pub(crate) fn parse_os_release(content: &str) -> OsInfo {
    let mut info = OsInfo::default();
    let mut version = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value.trim());
        match key.trim() {
            "NAME" => info.name = value,
            "ID" => info.platform = value,
            "VERSION_ID" => info.version = value,
            "VERSION" => version = Some(value),
            _ => {}
        }
    }

    if info.version.is_empty()
        && let Some(version) = version
    {
        info.version = version;
    }
    info
}

fn unquote(value: &str) -> String {
    let stripped = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(value).to_string()
}
