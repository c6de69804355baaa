//! Video model: one media post discovered on a channel.
//!
//! The post URL is the unique key. Media source URLs are time-limited and
//! may be overwritten any time before a download starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered media post and its download/upload state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    /// Absolute post page URL (unique key).
    pub url: String,
    /// Title as extracted from the listing page.
    pub title: String,
    /// Host-assigned opaque identifier parsed from the post URL.
    pub post_id: String,
    /// Direct CDN URL to the media bytes; resolved after discovery and
    /// refreshable on expiry.
    pub media_source_url: Option<String>,
    pub downloaded: bool,
    /// Absolute path of the finished file; set together with `downloaded`.
    pub download_path: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
    pub uploaded: bool,
    /// Message id returned by the delivery endpoint.
    pub upload_message_id: Option<String>,
    pub last_upload_attempt_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
}

impl Video {
    /// Create a freshly discovered video with no media URL yet.
    pub fn discovered(url: String, title: String, post_id: String) -> Self {
        Self {
            url,
            title,
            post_id,
            media_source_url: None,
            downloaded: false,
            download_path: None,
            downloaded_at: None,
            uploaded: false,
            upload_message_id: None,
            last_upload_attempt_at: None,
            discovered_at: Utc::now(),
        }
    }
}
