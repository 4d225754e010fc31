//! Configuration schema definitions.
//!
//! Two documents are described here:
//! - the hosts file, an ordered list of [`HostEntry`] records that is
//!   re-read whenever its modification time advances;
//! - [`ServerConfig`], the process settings read once at startup.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

/// Host value that matches every request host.
pub const DEFAULT_HOST: &str = "default";

/// One routing record: requests for `host` are served from `folder`.
///
/// Several hosts may point at the same folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HostEntry {
    /// Host to match exactly, or `"default"` to match anything.
    #[serde(alias = "Host")]
    pub host: String,

    /// Folder containing `templates/` and any files templates may read.
    #[serde(alias = "Folder")]
    pub folder: PathBuf,

    /// File inside `folder` whose modification time signals a change.
    #[serde(alias = "Modifier")]
    pub modifier: String,
}

impl HostEntry {
    pub fn new(host: impl Into<String>, folder: impl Into<PathBuf>, modifier: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            folder: folder.into(),
            modifier: modifier.into(),
        }
    }

    /// Returns true if this entry serves `host`.
    pub fn matches(&self, host: &str) -> bool {
        self.is_wildcard() || self.host == host
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == DEFAULT_HOST
    }

    /// Path of the modifier marker.
    pub fn marker_path(&self) -> PathBuf {
        self.folder.join(&self.modifier)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

/// TOML form of the hosts file, which cannot have a bare array at the top level.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HostsDocument {
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

/// Root process configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Template registry settings.
    pub registry: RegistryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Registry and reconciler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path of the hosts file.
    pub hosts_file: PathBuf,

    /// Seconds between reconciler ticks.
    pub poll_interval_secs: u64,

    /// Render attempts before an evicted blob becomes a hard error.
    pub max_render_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            hosts_file: PathBuf::from("hosts.json"),
            poll_interval_secs: 30,
            max_render_attempts: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
