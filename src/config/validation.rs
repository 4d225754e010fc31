//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of host entries (serde handles syntactic)
//! - Keep modifier markers inside their folder
//! - Flag entries shadowed by an earlier `default` entry
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Shadowed entries are a warning: they are harmless, only unreachable

use std::path::{Component, Path};
use thiserror::Error;

use crate::config::schema::HostEntry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("entry {index}: host is empty")]
    EmptyHost { index: usize },

    #[error("entry {index}: folder is empty")]
    EmptyFolder { index: usize },

    #[error("entry {index}: modifier {modifier:?} must be a file name inside the folder")]
    BadModifier { index: usize, modifier: String },
}

fn is_plain_relative(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn validate_hosts(entries: &[HostEntry]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if entry.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost { index });
        }
        if entry.folder.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyFolder { index });
        }
        if !is_plain_relative(&entry.modifier) {
            errors.push(ValidationError::BadModifier {
                index,
                modifier: entry.modifier.clone(),
            });
        }
    }

    if let Some(wildcard) = entries.iter().position(HostEntry::is_wildcard) {
        for entry in &entries[wildcard + 1..] {
            tracing::warn!(
                host = %entry.host,
                folder = %entry.folder.display(),
                "Host entry follows the default entry and will never match"
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
