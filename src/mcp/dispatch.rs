//! Host resolution and concurrent fan-out.
//!
//! [`resolve_hosts`] turns requested names into registry records.
//! [`Dispatcher::run_on_hosts`] then runs one [`HostTask`] per record, each
//! on its own Tokio task with its own session, and gathers every outcome into
//! a single map keyed by host name.
//!
//! # Guarantees
//!
//! - Hosts run concurrently; total latency tracks the slowest host.
//! - A failure on one host (including a panic in its task) lands in that
//!   host's slot only.
//! - Every resolved host gets exactly one entry, written once.
//! - A session that was opened is closed on every path.
//! - Cancellation interrupts the dial and the running task; the host is then
//!   reported as [`HostError::Cancelled`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mcp::error::{HostError, ResolutionError};
use crate::mcp::session::{Connector, RemoteSession};
use crate::mcp::storage::CredentialStorage;
use crate::mcp::types::HostRecord;

/// Outcome of a task on one host.
pub type TaskResult<T> = Result<T, HostError>;

/// Registered records for a request, plus the names that had none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub records: Vec<HostRecord>,
    pub unresolved: Vec<String>,
}

/// Look up each requested name in the registry.
///
/// Duplicate names are collapsed, keeping first-seen order. Unknown names
/// are collected in [`Resolution::unresolved`] and never dialed. Fails when
/// nothing was requested or nothing matched.
pub fn resolve_hosts(
    store: &dyn CredentialStorage,
    names: &[String],
) -> Result<Resolution, ResolutionError> {
    if names.is_empty() {
        return Err(ResolutionError::NoHostsRequested);
    }

    let mut seen = HashSet::new();
    let mut resolution = Resolution::default();
    for name in names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match store.get(name) {
            Some(record) => resolution.records.push(record),
            None => resolution.unresolved.push(name.clone()),
        }
    }

    if resolution.records.is_empty() {
        return Err(ResolutionError::NoMatchingHosts(resolution.unresolved));
    }
    if !resolution.unresolved.is_empty() {
        debug!("Unregistered hosts skipped: {}", resolution.unresolved.join(", "));
    }
    Ok(resolution)
}

/// Work run against one connected host.
///
/// `cancel` lets multi-step tasks stop between steps; the dispatcher also
/// races the whole task against it.
#[async_trait]
pub trait HostTask: Send + Sync + 'static {
    type Output: Send + 'static;

    async fn run(
        &self,
        host: &HostRecord,
        session: &mut dyn RemoteSession,
        cancel: &CancellationToken,
    ) -> TaskResult<Self::Output>;
}

/// Fan-out over a set of keyed units of work, fan-in into one map.
///
/// The map is the only state shared between units; each unit writes its own
/// key once when it finishes.
struct TaskGroup<T> {
    set: JoinSet<()>,
    results: Arc<Mutex<HashMap<String, TaskResult<T>>>>,
}

impl<T: Send + 'static> TaskGroup<T> {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            results: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn spawn<F>(&mut self, key: String, work: F)
    where
        F: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let results = Arc::clone(&self.results);
        self.set.spawn(async move {
            // Task panics are handled in `run_one`; this covers the dial.
            let outcome = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panic_error(&key, panic.as_ref())));
            results.lock().await.entry(key).or_insert(outcome);
        });
    }

    async fn join(mut self) -> HashMap<String, TaskResult<T>> {
        while let Some(joined) = self.set.join_next().await {
            if let Err(e) = joined {
                // Panics are caught inside the unit; only aborts reach here.
                warn!("Dispatch unit did not complete: {}", e);
            }
        }
        let mut results = self.results.lock().await;
        std::mem::take(&mut *results)
    }
}

fn panic_error(host: &str, panic: &(dyn std::any::Any + Send)) -> HostError {
    let reason = if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    };
    warn!("Task for {} panicked: {}", host, reason);
    HostError::execution(host, format!("task panicked: {}", reason))
}

/// Runs tasks on many hosts at once.
#[derive(Clone)]
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    limit: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    /// Dispatcher with no cap on simultaneous sessions.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            limit: None,
        }
    }

    /// Cap the number of hosts in flight at once. `None` means unbounded.
    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.limit = max.filter(|&n| n > 0).map(|n| Arc::new(Semaphore::new(n)));
        self
    }

    /// Run `task` on every record and wait for all of them.
    ///
    /// The returned map has exactly one entry per distinct record name.
    pub async fn run_on_hosts<T: HostTask>(
        &self,
        records: Vec<HostRecord>,
        task: Arc<T>,
        cancel: CancellationToken,
    ) -> HashMap<String, TaskResult<T::Output>> {
        let started = std::time::Instant::now();
        let host_count = records.len();
        let mut group = TaskGroup::new();

        for record in records {
            let connector = Arc::clone(&self.connector);
            let limit = self.limit.clone();
            let task = Arc::clone(&task);
            let cancel = cancel.clone();
            group.spawn(record.name.clone(), async move {
                let _permit = match limit {
                    Some(semaphore) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return Err(HostError::Cancelled { host: record.name.clone() });
                        }
                        permit = semaphore.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };
                run_one(connector.as_ref(), &record, task.as_ref(), &cancel).await
            });
        }

        let results = group.join().await;
        let failed = results.values().filter(|r| r.is_err()).count();
        info!(
            "Dispatch finished on {} host(s) in {:?} ({} failed)",
            host_count,
            started.elapsed(),
            failed
        );
        results
    }
}

/// Connect, run, close. The session is closed whatever the task returns.
async fn run_one<T: HostTask>(
    connector: &dyn Connector,
    record: &HostRecord,
    task: &T,
    cancel: &CancellationToken,
) -> TaskResult<T::Output> {
    let cancelled = || HostError::Cancelled {
        host: record.name.clone(),
    };

    if cancel.is_cancelled() {
        return Err(cancelled());
    }

    debug!("Connecting to {} ({}@{})", record.name, record.user, record.address());
    let mut session = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled()),
        connected = connector.connect(record) => connected?,
    };

    debug!("Running task on {}", record.name);
    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        outcome = AssertUnwindSafe(task.run(record, session.as_mut(), cancel)).catch_unwind() => {
            outcome.unwrap_or_else(|panic| Err(panic_error(&record.name, panic.as_ref())))
        }
    };

    session.close().await;

    if let Err(e) = &outcome {
        debug!("Task on {} failed: {}", record.name, e);
    }
    outcome
}
