//! Storage trait definition for the host registry.
//!
//! The trait is the seam between the dispatcher and the persisted registry,
//! enabling dependency injection and testability.

use crate::mcp::error::PersistenceError;
use crate::mcp::types::HostRecord;

/// Durable mapping from host name to [`HostRecord`].
///
/// Implementations perform no internal locking. Readers may share the store
/// freely; mutating calls must be serialized by the caller (the composition
/// root keeps the store behind a `tokio::sync::RwLock`).
pub trait CredentialStorage: Send + Sync {
    /// Look up a record by name.
    fn get(&self, name: &str) -> Option<HostRecord>;

    /// Insert or replace a record keyed by `record.name`, then persist.
    fn set(&mut self, record: HostRecord) -> Result<(), PersistenceError>;

    /// Remove a record if present, then persist. Removing an unknown name
    /// is not an error.
    fn delete(&mut self, name: &str) -> Result<(), PersistenceError>;

    /// All records, in unspecified order.
    fn list(&self) -> Vec<HostRecord>;

    /// Check if a record exists.
    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
