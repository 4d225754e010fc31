//! Sandboxed file access.
//!
//! # Responsibilities
//! - Resolve a requested name against a root folder
//! - Reject any name that could leave the root
//! - Read raw bytes, headed documents and markdown from inside the root
//!
//! # Design Decisions
//! - Resolution is lexical: `..` segments, absolute paths and drive
//!   prefixes are refused outright instead of being normalised away
//! - The joined path must still be component-wise prefixed by the root,
//!   so a sibling such as `site2/` never passes for `site/`
//! - Reads are synchronous; callers impose their own deadlines

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::content::{render_markdown, split_headed};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path {requested:?} escapes its root folder")]
    PathEscape { requested: String },

    #[error("file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File reader confined to one root folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedFs {
    root: PathBuf,
}

impl SandboxedFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `name` onto the root, refusing anything that escapes it.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let escape = || SandboxError::PathEscape {
            requested: name.to_string(),
        };

        let mut resolved = self.root.clone();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(escape());
                }
            }
        }

        if !resolved.starts_with(&self.root) {
            return Err(escape());
        }
        Ok(resolved)
    }

    /// Read the exact bytes of `name`.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, SandboxError> {
        let path = self.resolve(name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SandboxError::NotFound { path },
            _ => SandboxError::Io { path, source },
        })
    }

    /// Read `name` as text, replacing invalid UTF-8.
    pub fn read_text(&self, name: &str) -> Result<String, SandboxError> {
        let bytes = self.read(name)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read `name` and split it into header fields plus `contents`.
    pub fn read_headed(&self, name: &str) -> Result<BTreeMap<String, String>, SandboxError> {
        Ok(split_headed(&self.read_text(name)?))
    }

    /// Read `name` and render it as markdown.
    pub fn read_markdown(&self, name: &str) -> Result<String, SandboxError> {
        Ok(render_markdown(&self.read_text(name)?))
    }
}
