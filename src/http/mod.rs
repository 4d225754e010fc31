//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, host, page data)
//!     → registry (host → folder → rendered template, or sandboxed static file)
//!     → response.rs (status mapping, content type)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeRequestUuid, PageData, X_REQUEST_ID};
pub use server::HttpServer;
