//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{HostEntry, HostsDocument, ServerConfig};
use crate::config::validation::{validate_hosts, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

/// Load and validate the ordered host entries.
///
/// `.toml` files use a `[[hosts]]` array; anything else is read as a JSON array.
pub fn load_hosts(path: &Path) -> Result<Vec<HostEntry>, ConfigError> {
    let content = read(path)?;
    let entries = if is_toml(path) {
        toml::from_str::<HostsDocument>(&content)?.hosts
    } else {
        serde_json::from_str::<Vec<HostEntry>>(&content)?
    };

    validate_hosts(&entries).map_err(ConfigError::Validation)?;

    Ok(entries)
}

/// Load server settings from a TOML file.
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = read(path)?;
    Ok(toml::from_str(&content)?)
}
