//! Blob cache client.
//!
//! # Data Flow
//! ```text
//! template calls blob(key)
//!     → access.rs (engine function bound to one folder)
//!     → BlobStore::get(key)
//!     → bytes, or BlobError::Evicted when the entry was reclaimed mid-read
//!     → Evicted travels up as the source of the render error
//!     → registry retries the whole render against a fresh snapshot
//! ```
//!
//! # Design Decisions
//! - Eviction is a typed, transient variant, not a shared sentinel value
//! - Each Template Root holds a [`BlobSubscription`]; dropping the Root
//!   (after its last in-flight render) releases it

pub mod access;
pub mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use access::register_blob_access;
pub use memory::MemoryBlobStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    /// The entry existed when referenced but was reclaimed before the read finished.
    #[error("blob {key} was evicted while being read")]
    Evicted { key: String },

    #[error("no blob stored under {key}")]
    NotFound { key: String },

    #[error("blob store failure: {0}")]
    Store(String),
}

impl BlobError {
    /// True when retrying the surrounding operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlobError::Evicted { .. })
    }
}

/// Content cache consulted by templates.
pub trait BlobStore: Send + Sync + 'static {
    /// Fetch the bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Arc<[u8]>, BlobError>;

    /// A Template Root for `owner` started using the store.
    fn retain(&self, _owner: &Path) {}

    /// A Template Root for `owner` was torn down.
    fn release(&self, _owner: &Path) {}
}

/// Keeps a folder registered with a store until dropped.
pub struct BlobSubscription {
    store: Arc<dyn BlobStore>,
    owner: PathBuf,
}

impl BlobSubscription {
    pub fn new(store: Arc<dyn BlobStore>, owner: &Path) -> Self {
        store.retain(owner);
        Self {
            store,
            owner: owner.to_path_buf(),
        }
    }
}

impl Drop for BlobSubscription {
    fn drop(&mut self) {
        tracing::debug!(folder = %self.owner.display(), "Releasing blob subscription");
        self.store.release(&self.owner);
    }
}

impl std::fmt::Debug for BlobSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobSubscription")
            .field("owner", &self.owner)
            .finish()
    }
}
