//! Stateless text helpers used by templates and the sandbox.

pub mod headed;
pub mod markdown;

pub use headed::{split_headed, CONTENTS_KEY};
pub use markdown::render_markdown;
