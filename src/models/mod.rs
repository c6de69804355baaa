//! Core data models for channels and videos.

mod channel;
mod video;

pub use channel::Channel;
pub use video::Video;
