//! Host → folder → compiled templates registry.
//!
//! # Data Flow
//! ```text
//! execute(out, host, template, data)
//!     → manager.rs: first entry matching host (or "default") → folder
//!     → load snapshot (lock-free) → Arc<TemplateRoot> for folder
//!     → render into a private String
//!         → blob evicted? re-fetch the root and render again (bounded)
//!     → write the whole output once
//!
//! Every poll interval (reconciler.rs):
//!     hosts file mtime advanced → load, rebuild every folder, swap all
//!     marker mtime advanced     → rebuild that folder, swap one entry
//!     failures                  → logged, last good state keeps serving
//! ```
//!
//! # Design Decisions
//! - The snapshot lives in an `ArcSwap`; writers serialise on one mutex
//!   held only while publishing, never while compiling or reading files
//! - Roots are `Arc`-shared, so a swapped-out root is torn down only when
//!   the last in-flight render using it finishes
//! - Request-time errors go to the caller; background errors go to the log

pub mod manager;
pub mod reconciler;

use thiserror::Error;

use crate::blob::access::find_blob_error;
use crate::config::ConfigError;
use crate::sandbox::SandboxError;

pub use manager::{Registry, RegistryOptions, RegistryState, MAX_RENDER_ATTEMPTS};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerState};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to load hosts file: {0}")]
    Config(#[from] ConfigError),

    #[error("no host configured for {host:?}")]
    NoHostConfigured { host: String },

    #[error("no templates available for host {host:?}")]
    NoTemplatesForHost { host: String },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("failed to render {template:?}: {source}")]
    Render {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("gave up rendering {template:?} after {attempts} attempts: blob entries kept being evicted")]
    RetryExhausted { template: String, attempts: u32 },

    #[error("failed to write rendered output: {0}")]
    Write(#[source] std::io::Error),

    #[error("registry has been shut down")]
    ShutDown,

    #[error("no Tokio runtime to run the reconciler on")]
    NoRuntime,
}

impl RegistryError {
    /// True when a render failed only because a blob was evicted mid-read.
    pub fn is_evicted(&self) -> bool {
        match self {
            RegistryError::Render { source, .. } => {
                find_blob_error(source).is_some_and(|blob| blob.is_transient())
            }
            _ => false,
        }
    }

    /// True when the requested template does not exist in the folder's set.
    pub fn is_template_missing(&self) -> bool {
        matches!(
            self,
            RegistryError::Render { source, .. } if source.kind() == minijinja::ErrorKind::TemplateNotFound
        )
    }
}
