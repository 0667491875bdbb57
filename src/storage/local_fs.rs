//! # Local Filesystem Object Store
//!
//! Maps object keys onto a directory tree. Writes go to a temporary sibling file
//! and are renamed into place, so a reader never observes a half-written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use uuid::Uuid;

use super::{validate_key, ObjectMeta, ObjectStore, StorageError};

const TEMP_FILE_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct LocalFsObjectStore {
    root: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }

    async fn meta_for(&self, key: &str, path: &Path) -> Result<ObjectMeta, StorageError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| map_io_error("stat", key, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| StorageError::io("stat", key, e))?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: metadata.len(),
            last_modified: DateTime::<Utc>::from(modified),
        })
    }

    /// Deepest directory that can contain keys starting with `prefix`.
    fn listing_base(&self, prefix: &str) -> PathBuf {
        match prefix.rfind('/') {
            Some(idx) => prefix[..idx]
                .split('/')
                .filter(|segment| !segment.is_empty())
                .fold(self.root.clone(), |path, segment| path.join(segment)),
            None => self.root.clone(),
        }
    }
}

fn map_io_error(operation: &str, key: &str, error: std::io::Error) -> StorageError {
    if error.kind() == ErrorKind::NotFound {
        StorageError::not_found(key)
    } else {
        StorageError::io(operation, key, error)
    }
}

#[async_trait]
impl ObjectStore for LocalFsObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        fs::read(&path).await.map_err(|e| map_io_error("get", key, e))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<ObjectMeta, StorageError> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::invalid_key(key, "key has no parent directory"))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io("put", key, e))?;

        let temp_path = parent.join(format!("{TEMP_FILE_PREFIX}{}", Uuid::new_v4()));
        if let Err(e) = fs::write(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io("put", key, e));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::io("put", key, e));
        }

        self.meta_for(key, &path).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("delete", key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let base = self.listing_base(prefix);
        let mut pending = vec![base];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::io("list", prefix, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io("list", prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io("list", prefix, e))?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if entry.file_name().to_string_lossy().starts_with(TEMP_FILE_PREFIX) {
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    continue;
                };
                if !key.starts_with(prefix) {
                    continue;
                }
                match self.meta_for(&key, &path).await {
                    Ok(meta) => found.push(meta),
                    // Deleted between read_dir and stat
                    Err(StorageError::NotFound { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let path = self.path_for(key)?;
        match self.meta_for(key, &path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local_fs"
    }
}
