//! Key-value persistence for session records.
//!
//! Keys are `namespace/name` pairs of plain segments (`sessions/{id}`,
//! `claims/{id}`, `cleanup/{id}`). A shared store can replace the filesystem
//! implementation for multi-instance deployments.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use uuid::Uuid;

/// Key-value store errors.
#[derive(Debug, Error)]
pub enum KvError {
    /// Key is not a `namespace/name` pair of safe segments.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A write-once key is already taken.
    #[error("key already exists: {0}")]
    AlreadyExists(String),

    /// Stored value could not be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt {
        /// Key of the value.
        key: String,
        /// Decoder message.
        reason: String,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Small persistence interface the session store is built on.
#[async_trait]
pub trait SessionKv: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError>;

    /// Write a value only if the key is absent. Returns whether it was written.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, KvError>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Keys in a namespace, ascending.
    async fn list(&self, namespace: &str) -> Result<Vec<String>, KvError>;
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn split_key(key: &str) -> Result<(&str, &str), KvError> {
    key.split_once('/')
        .filter(|(namespace, name)| is_plain_segment(namespace) && is_plain_segment(name))
        .ok_or_else(|| KvError::InvalidKey(key.to_string()))
}

/// Filesystem store: one JSON document per key, written atomically.
#[derive(Debug, Clone)]
pub struct FsKv {
    root: PathBuf,
}

impl FsKv {
    /// Create a store rooted at `root`; directories are created on demand.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, KvError> {
        let (namespace, name) = split_key(key)?;
        Ok(self.root.join(namespace).join(format!("{name}.json")))
    }

    /// Write `value` to a unique temp file next to `path`.
    async fn write_temp(path: &Path, value: &[u8]) -> Result<PathBuf, KvError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp, value).await?;
        Ok(temp)
    }
}

#[async_trait]
impl SessionKv for FsKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        let path = self.path_for(key)?;
        let temp = Self::write_temp(&path, &value).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, KvError> {
        let path = self.path_for(key)?;
        let temp = Self::write_temp(&path, &value).await?;
        // hard_link fails when the target exists, so the complete document
        // appears atomically or not at all.
        let linked = tokio::fs::hard_link(&temp, &path).await;
        let _ = tokio::fs::remove_file(&temp).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, KvError> {
        if !is_plain_segment(namespace) {
            return Err(KvError::InvalidKey(namespace.to_string()));
        }
        let mut entries = match tokio::fs::read_dir(self.root.join(namespace)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if is_plain_segment(name) {
                keys.push(format!("{namespace}/{name}"));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionKv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        split_key(key)?;
        Ok(self.entries.get(key).map(|value| value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), KvError> {
        split_key(key)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, KvError> {
        split_key(key)?;
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        split_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, KvError> {
        let prefix = format!("{namespace}/");
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(&prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn exercise(kv: Arc<dyn SessionKv>) {
        assert!(kv.get("sessions/a").await.expect("get").is_none());

        kv.put("sessions/a", b"one".to_vec()).await.expect("put");
        kv.put("sessions/a", b"two".to_vec()).await.expect("overwrite");
        assert_eq!(kv.get("sessions/a").await.expect("get").as_deref(), Some(&b"two"[..]));

        assert!(kv.put_if_absent("claims/a", b"x".to_vec()).await.expect("cas"));
        assert!(!kv.put_if_absent("claims/a", b"y".to_vec()).await.expect("cas"));
        assert_eq!(kv.get("claims/a").await.expect("get").as_deref(), Some(&b"x"[..]));

        kv.put("sessions/b", b"three".to_vec()).await.expect("put");
        assert_eq!(
            kv.list("sessions").await.expect("list"),
            vec!["sessions/a".to_string(), "sessions/b".to_string()]
        );
        assert!(kv.list("cleanup").await.expect("list").is_empty());

        kv.delete("sessions/a").await.expect("delete");
        kv.delete("sessions/a").await.expect("delete twice");
        kv.delete("sessions/missing").await.expect("delete unknown");
        assert!(kv.get("sessions/a").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_memory_kv_contract() {
        exercise(Arc::new(MemoryKv::new())).await;
    }

    #[tokio::test]
    async fn test_fs_kv_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        exercise(Arc::new(FsKv::new(dir.path()))).await;
    }

    #[tokio::test]
    async fn test_fs_kv_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = FsKv::new(dir.path());
        kv.put("sessions/a", b"1".to_vec()).await.expect("put");
        kv.put_if_absent("sessions/a", b"2".to_vec()).await.expect("cas");

        let names: Vec<String> = std::fs::read_dir(dir.path().join("sessions"))
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_keys() {
        let kv = MemoryKv::new();
        for key in ["../etc/passwd", "sessions", "sessions/a/b", "/a", "a/"] {
            assert!(matches!(
                kv.put(key, Vec::new()).await,
                Err(KvError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_concurrent_put_if_absent_single_winner() {
        let kv: Arc<dyn SessionKv> = Arc::new(MemoryKv::new());
        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let kv = Arc::clone(&kv);
            tasks.push(tokio::spawn(async move {
                kv.put_if_absent("claims/x", vec![i]).await.expect("cas")
            }));
        }
        let mut winners = 0;
        for task in tasks {
            if task.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
