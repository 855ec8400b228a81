//! In-memory transport for exercising dispatch without a network.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::mcp::error::HostError;
use crate::mcp::session::{Connector, RemoteSession};
use crate::mcp::types::HostRecord;

/// Scripted behavior of one fake host.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeHost {
    /// Password the host accepts; anything else fails authentication.
    pub password: String,
    pub connect_delay: Duration,
    pub exec_delay: Duration,
    /// Command -> merged output, or the failure reason.
    pub commands: HashMap<String, Result<String, String>>,
}

impl FakeHost {
    pub fn accepting(password: &str) -> Self {
        Self {
            password: password.to_string(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: &str, output: Result<&str, &str>) -> Self {
        self.commands.insert(
            command.to_string(),
            output.map(str::to_string).map_err(str::to_string),
        );
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }
}

/// Connector backed by [`FakeHost`] scripts keyed by `record.host`.
#[derive(Debug, Default)]
pub(crate) struct FakeConnector {
    hosts: HashMap<String, FakeHost>,
    pub connects: Arc<Mutex<Vec<String>>>,
    pub executed: Arc<Mutex<Vec<(String, String)>>>,
    pub closes: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, script: FakeHost) -> Self {
        self.hosts.insert(host.to_string(), script);
        self
    }

    pub async fn connect_attempts(&self) -> Vec<String> {
        self.connects.lock().await.clone()
    }

    pub async fn executed_commands(&self) -> Vec<(String, String)> {
        self.executed.lock().await.clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, record: &HostRecord) -> Result<Box<dyn RemoteSession>, HostError> {
        self.connects.lock().await.push(record.name.clone());

        let script = self
            .hosts
            .get(&record.host)
            .cloned()
            .ok_or_else(|| HostError::connection(&record.name, "Failed to connect: no route to host"))?;

        tokio::time::sleep(script.connect_delay).await;

        if script.password != record.pass {
            return Err(HostError::connection(
                &record.name,
                "Authentication failed: password rejected",
            ));
        }

        Ok(Box::new(FakeSession {
            name: record.name.clone(),
            script,
            open: true,
            executed: Arc::clone(&self.executed),
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct FakeSession {
    name: String,
    script: FakeHost,
    open: bool,
    executed: Arc<Mutex<Vec<(String, String)>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn exec(&mut self, command: &str) -> Result<Vec<u8>, HostError> {
        if !self.open {
            return Err(HostError::execution(&self.name, "session is closed"));
        }
        self.executed
            .lock()
            .await
            .push((self.name.clone(), command.to_string()));
        tokio::time::sleep(self.script.exec_delay).await;

        match self.script.commands.get(command) {
            Some(Ok(output)) => Ok(output.clone().into_bytes()),
            Some(Err(reason)) => Err(HostError::execution(&self.name, reason.clone())),
            None => Err(HostError::execution(
                &self.name,
                "process exited with status 127",
            )),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Host record pointing at a fake host of the same name.
pub(crate) fn fake_record(name: &str, password: &str) -> HostRecord {
    HostRecord {
        name: name.to_string(),
        host: name.to_string(),
        port: 22,
        user: "ops".to_string(),
        pass: password.to_string(),
        os: None,
    }
}
