//! Storage abstractions for the host registry.
//!
//! This module provides a trait-based storage abstraction that enables:
//! - Dependency injection for testability
//! - A YAML file implementation with atomic full-rewrite persistence

mod file;
mod traits;

pub use file::FileCredentialStore;
pub use traits::CredentialStorage;
