//! In-process, content-addressed blob store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use dashmap::{DashMap, DashSet};
use sha2::{Digest, Sha256};

use crate::blob::{BlobError, BlobStore};

/// Thread-safe blob store keyed by the SHA-256 of each blob.
///
/// Evicted keys are remembered, so a later read of a key that used to exist
/// reports [`BlobError::Evicted`] rather than [`BlobError::NotFound`] until
/// the same content is stored again.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    entries: DashMap<String, Arc<[u8]>>,
    evicted: DashSet<String>,
    subscribers: DashMap<PathBuf, usize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content address for `data`.
    pub fn key_for(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    /// Store `data` and return its key.
    pub fn put(&self, data: &[u8]) -> String {
        let key = Self::key_for(data);
        self.evicted.remove(&key);
        self.entries.insert(key.clone(), Arc::from(data));
        key
    }

    /// Reclaim `key`. Returns false if nothing was stored under it.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.evicted.insert(key.to_string());
            tracing::debug!(key = %key, "Blob evicted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of live subscriptions held for `owner`.
    pub fn subscribers(&self, owner: &Path) -> usize {
        self.subscribers.get(owner).map(|count| *count).unwrap_or(0)
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Arc<[u8]>, BlobError> {
        if let Some(entry) = self.entries.get(key) {
            return Ok(entry.value().clone());
        }
        if self.evicted.contains(key) {
            Err(BlobError::Evicted { key: key.to_string() })
        } else {
            Err(BlobError::NotFound { key: key.to_string() })
        }
    }

    fn retain(&self, owner: &Path) {
        *self.subscribers.entry(owner.to_path_buf()).or_insert(0) += 1;
    }

    fn release(&self, owner: &Path) {
        let emptied = match self.subscribers.get_mut(owner) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if emptied {
            self.subscribers.remove_if(owner, |_, count| *count == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_evict() {
        let store = MemoryBlobStore::new();
        assert!(store.is_empty());
        let key = store.put(b"hello");
        assert_eq!(store.len(), 1);
        assert_eq!(key, MemoryBlobStore::key_for(b"hello"));
        assert_eq!(&*store.get(&key).unwrap(), b"hello");

        assert!(store.evict(&key));
        assert!(store.is_empty());
        assert_eq!(store.get(&key), Err(BlobError::Evicted { key: key.clone() }));

        // repopulating clears the eviction
        store.put(b"hello");
        assert_eq!(&*store.get(&key).unwrap(), b"hello");
    }

    #[test]
    fn test_unknown_key() {
        let store = MemoryBlobStore::new();
        assert!(!store.evict("missing"));
        assert_eq!(store.get("missing"), Err(BlobError::NotFound { key: "missing".into() }));
    }
}
