//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Render attempt:
//!     → template reads a blob
//!     → blob evicted mid-read (transient)
//!     → retries.rs re-runs the whole render against a fresh snapshot
//!     → bound reached: hard error to the caller
//! ```

pub mod retries;

pub use retries::{retry_transient, RetryError};
