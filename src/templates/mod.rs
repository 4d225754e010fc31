//! Template subsystem.
//!
//! # Data Flow
//! ```text
//! folder/templates/*.* (dot-prefixed names skipped)
//!     → root.rs (read sources, compile into one Environment)
//!         ← functions.rs (helpers + sandboxed file readers)
//!         ← blob::access (blob readers, when a store is configured)
//!     → TemplateRoot (immutable, shared via Arc)
//! ```
//!
//! # Design Decisions
//! - Functions are registered before any source is compiled
//! - Template names are source file names, so `{% include 'nav.html' %}`
//!   works across the set
//! - Output is never auto-escaped

pub mod functions;
pub mod root;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use minijinja::Environment;
use thiserror::Error;

use crate::blob::{register_blob_access, BlobStore, BlobSubscription};
use crate::sandbox::SandboxedFs;

pub use root::{TemplateRoot, TEMPLATE_DIR};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no templates found for {}", .pattern.display())]
    NoTemplatesFound { pattern: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile {}: {source}", .path.display())]
    Compile {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
}

/// Function set bound into every Template Root.
#[derive(Clone, Default)]
pub struct Extensions {
    blob_store: Option<Arc<dyn BlobStore>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Register all functions for `folder`, returning the blob subscription if any.
    pub fn install(&self, env: &mut Environment<'static>, folder: &Path) -> Option<BlobSubscription> {
        functions::register_helpers(env);
        functions::register_file_access(env, SandboxedFs::new(folder));
        self.blob_store
            .as_ref()
            .map(|store| register_blob_access(env, store.clone(), folder))
    }
}

impl std::fmt::Debug for Extensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extensions")
            .field("blob_store", &self.blob_store.is_some())
            .finish()
    }
}
