//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse flags → Load settings → Start registry (initial build + reconciler) → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C → Stop accepting → Drain requests → Registry shutdown
//! ```
//!
//! # Design Decisions
//! - Shutdown is cooperative: the reconciler stops, in-flight renders finish
//! - Triggering twice is harmless

pub mod shutdown;

pub use shutdown::Shutdown;
