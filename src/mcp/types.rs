//! Host records and serializable response types.
//!
//! [`HostRecord`] is the persisted registry entry. The remaining types are
//! MCP response payloads and implement `JsonSchema` for protocol
//! compatibility. Passwords never appear in a response type.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Default SSH port used when a connection string omits one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Cached operating system descriptor for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OsInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub arch: String,
}

/// Persisted credentials and metadata for one remote machine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    pub user: String,
    pub pass: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
}

impl HostRecord {
    /// `host:port` pair used to dial the record.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Whether every field needed to open a session is present.
    pub fn is_connectable(&self) -> bool {
        !self.host.is_empty() && self.port != 0 && !self.user.is_empty() && !self.pass.is_empty()
    }
}

// Keep the password out of logs.
impl fmt::Debug for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRecord")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .field("os", &self.os)
            .finish()
    }
}

/// Registries written by older tooling store the port as a string.
fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortRepr {
        Number(u16),
        Text(String),
    }

    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(port) => Ok(port),
        PortRepr::Text(text) if text.is_empty() => Ok(DEFAULT_SSH_PORT),
        PortRepr::Text(text) => text
            .parse::<u16>()
            .map_err(|e| serde::de::Error::custom(format!("invalid port {text:?}: {e}"))),
    }
}

/// Public view of a host record, without the password.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostSummary {
    pub name: String,
    pub host: String,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub port: u16,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsInfo>,
}

impl From<&HostRecord> for HostSummary {
    fn from(record: &HostRecord) -> Self {
        Self {
            name: record.name.clone(),
            host: record.host.clone(),
            port: record.port,
            user: record.user.clone(),
            os: record.os.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HostListResponse {
    /// Registered hosts, sorted by name
    pub hosts: Vec<HostSummary>,
    /// Total number of registered hosts
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddHostResponse {
    pub host: HostSummary,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveHostResponse {
    pub name: String,
    /// Whether the host was registered before removal
    pub removed: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct OsInfoResponse {
    /// Cached OS information keyed by host name (null when never collected)
    pub hosts: BTreeMap<String, Option<OsInfo>>,
    /// Requested names that are not registered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

/// Outcome of a task on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HostOutcome {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostOutcome {
    pub fn success(host: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(host: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            host: host.into(),
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcome of one operation across several hosts.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HostResultsResponse {
    /// Per-host outcomes keyed by host name
    pub results: BTreeMap<String, HostOutcome>,
    /// Requested names that are not registered (never dispatched)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub succeeded: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub failed: usize,
    /// When the last host finished (RFC3339 format)
    pub completed_at: String,
}

impl HostResultsResponse {
    pub fn new(results: BTreeMap<String, HostOutcome>, unresolved: Vec<String>) -> Self {
        let succeeded = results.values().filter(|o| o.is_success()).count();
        let failed = results.len() - succeeded;
        Self {
            results,
            unresolved,
            succeeded,
            failed,
            completed_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
