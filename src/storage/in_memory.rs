//! # In-Memory Object Store
//!
//! Thread-safe in-memory object store for testing and single-process runs.
//!
//! ## Features
//!
//! - **Sorted Keys**: `BTreeMap` storage so prefix listings come back in key order
//! - **Clock-Driven Timestamps**: last-modified comes from the injected [`Clock`]
//! - **Fault Injection**: fail chosen operations on keys matching a fragment

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{validate_key, ObjectMeta, ObjectStore, StorageError};
use crate::utils::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Get,
    Put,
    Delete,
    List,
}

impl StorageOperation {
    fn name(self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
            StorageOperation::List => "list",
        }
    }
}

#[derive(Debug, Clone)]
struct FaultRule {
    operation: StorageOperation,
    key_fragment: String,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    faults: RwLock<Vec<FaultRule>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            faults: RwLock::new(Vec::new()),
            clock,
        }
    }

    /// Fail `operation` on keys containing `key_fragment` (for testing).
    /// `times: None` keeps failing until [`clear_faults`](Self::clear_faults).
    pub fn fail_on(&self, operation: StorageOperation, key_fragment: &str, times: Option<u32>) {
        self.faults.write().push(FaultRule {
            operation,
            key_fragment: key_fragment.to_string(),
            remaining: times,
        });
    }

    pub fn clear_faults(&self) {
        self.faults.write().clear();
    }

    /// Number of stored objects (for testing)
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// All keys in order (for testing)
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    fn check_fault(&self, operation: StorageOperation, key: &str) -> Result<(), StorageError> {
        let mut faults = self.faults.write();
        let hit = faults
            .iter_mut()
            .find(|rule| rule.operation == operation && key.contains(&rule.key_fragment));

        let Some(rule) = hit else {
            return Ok(());
        };
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        faults.retain(|rule| rule.remaining != Some(0));

        Err(StorageError::io(
            operation.name(),
            key,
            "injected storage failure",
        ))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.check_fault(StorageOperation::Get, key)?;
        self.objects
            .read()
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StorageError> {
        validate_key(key)?;
        self.check_fault(StorageOperation::Put, key)?;

        let last_modified = self.clock.now();
        let size = bytes.len() as u64;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                last_modified,
            },
        );

        Ok(ObjectMeta {
            key: key.to_string(),
            size,
            last_modified,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.check_fault(StorageOperation::Delete, key)?;
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        self.check_fault(StorageOperation::List, prefix)?;
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectMeta {
                key: key.clone(),
                size: object.bytes.len() as u64,
                last_modified: object.last_modified,
            })
            .collect())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).map(|object| ObjectMeta {
            key: key.to_string(),
            size: object.bytes.len() as u64,
            last_modified: object.last_modified,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_put_get_list_delete() {
        let store = InMemoryObjectStore::new();
        store.put("root/a/1", b"one".to_vec()).await.unwrap();
        store.put("root/a/2", b"two".to_vec()).await.unwrap();
        store.put("root/b/1", b"three".to_vec()).await.unwrap();
        store.put("rootless", b"x".to_vec()).await.unwrap();

        assert_eq!(store.get("root/a/2").await.unwrap(), b"two");

        let listed: Vec<String> = store
            .list("root/a/")
            .await
            .unwrap()
            .into_iter()
            .map(|meta| meta.key)
            .collect();
        assert_eq!(listed, vec!["root/a/1", "root/a/2"]);

        store.delete("root/a/1").await.unwrap();
        store.delete("root/a/1").await.unwrap();
        assert!(store.get("root/a/1").await.unwrap_err().is_not_found());
        assert_eq!(store.object_count(), 3);
    }

    #[tokio::test]
    async fn test_last_modified_follows_clock() {
        let start = Utc.with_ymd_and_hms(2025, 4, 15, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = InMemoryObjectStore::with_clock(clock.clone());

        store.put("k/1", vec![1]).await.unwrap();
        clock.advance(Duration::minutes(3));
        store.put("k/2", vec![2]).await.unwrap();

        let listed = store.list("k/").await.unwrap();
        assert_eq!(listed[0].last_modified, start);
        assert_eq!(listed[1].last_modified, start + Duration::minutes(3));
        assert_eq!(store.head("k/2").await.unwrap().unwrap().size, 1);
        assert!(store.head("k/3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fault_injection_counts_down() {
        let store = InMemoryObjectStore::new();
        store.fail_on(StorageOperation::Put, "flaky", Some(1));

        let err = store.put("x/flaky", vec![]).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.put("x/flaky", vec![]).await.is_ok());
        assert!(store.put("x/steady", vec![]).await.is_ok());
    }
}
