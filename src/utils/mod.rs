//! Shared utility functions.
//!
//! - `format`: human-readable sizes and durations for status output
//! - `naming`: filename derivation and caption escaping

mod format;
mod naming;

pub use format::{format_duration, format_size};
pub use naming::{escape_markdown, extension_from_url, sanitize_title, video_file_name};
