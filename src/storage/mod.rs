//! # Object Storage
//!
//! The pipeline treats object storage as a byte-addressable store: read, write,
//! delete and list by key prefix, with last-modified metadata. Everything the
//! pipeline knows durably about batches is derived from what this store lists.
//!
//! ## Backends
//!
//! - [`InMemoryObjectStore`]: process-local, clock-driven timestamps, fault
//!   injection for tests
//! - [`LocalFsObjectStore`]: a directory tree on local disk with atomic writes

pub mod errors;
pub mod in_memory;
pub mod layout;
pub mod local_fs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

pub use errors::StorageError;
pub use in_memory::{InMemoryObjectStore, StorageOperation};
pub use layout::{ArtifactKind, BatchLayout, ParsedKey};
pub use local_fs::LocalFsObjectStore;

/// Metadata returned by listings and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + Debug + 'static {
    /// Read an object's bytes
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write (or overwrite) an object; the write is all-or-nothing
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StorageError>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All objects whose key starts with `prefix`, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    /// Metadata for one object, `None` if absent
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Keys are `/`-separated relative paths with no empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::invalid_key(key, "key is empty"));
    }
    if key.starts_with('/') {
        return Err(StorageError::invalid_key(key, "key must be relative"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(StorageError::invalid_key(key, "empty path segment")),
            "." | ".." => return Err(StorageError::invalid_key(key, "relative path segment")),
            _ => {}
        }
    }
    Ok(())
}
