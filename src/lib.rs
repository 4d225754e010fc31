//! Hot-reloading multi-host template server.

pub mod blob;
pub mod config;
pub mod content;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod sandbox;
pub mod templates;

pub use config::schema::ServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{Registry, RegistryError, RegistryOptions};
