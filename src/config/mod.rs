//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! hosts file (JSON array or TOML [[hosts]])
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Vec<HostEntry> (validated, immutable)
//!     → installed into the registry snapshot
//!
//! On every reconciler tick:
//!     watcher.rs compares the file's mtime with the last one acted on
//!     → loader.rs loads new entries
//!     → validation.rs validates
//!     → registry swaps entries and rebuilds every folder
//! ```
//!
//! # Design Decisions
//! - Entries are immutable once loaded; changes require full reload
//! - A file that fails to load leaves the running entries in place
//! - Server settings (`ServerConfig`) are read once and never reloaded

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_hosts, load_server_config, ConfigError};
pub use schema::{HostEntry, ListenerConfig, ObservabilityConfig, RegistryConfig, ServerConfig, DEFAULT_HOST};
