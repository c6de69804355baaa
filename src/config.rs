//! Runtime settings assembled from CLI arguments and environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::upload::DeliverySettings;

/// Shape of the target site: how posts and media are recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Path marker identifying post pages (post ids follow it).
    pub post_path_marker: String,
    /// Extension of direct media URLs on the host.
    pub media_extension: String,
    /// Hosts that serve media bytes; any request to them counts as media.
    pub cdn_hosts: Vec<String>,
    /// Listing page size used to derive pagination offsets.
    pub page_size: usize,
    /// Maximum listing pages walked per monitoring scan.
    pub monitor_page_cap: usize,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            post_path_marker: "/post/".to_string(),
            media_extension: ".mp4".to_string(),
            cdn_hosts: Vec::new(),
            page_size: 30,
            monitor_page_cap: 10,
        }
    }
}

/// Resolved process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Root for downloads and the event log.
    pub download_dir: PathBuf,
    /// Challenge-solver endpoint.
    pub solver_url: String,
    /// Delivery endpoint; present only when token, chat id, and base URL
    /// are all configured.
    pub delivery: Option<DeliverySettings>,
    pub download_workers: usize,
    pub upload_workers: usize,
    pub session_ttl: Duration,
    /// Default check interval for newly added channels.
    pub default_interval_minutes: i64,
    /// Delay between automation cycles.
    pub cycle_delay: Duration,
    pub site: SiteProfile,
}

impl Settings {
    /// Interpret a store DSN. Plain paths and `sqlite://` URLs are accepted.
    pub fn database_path_from_dsn(dsn: &str) -> PathBuf {
        let stripped = dsn
            .strip_prefix("sqlite://")
            .or_else(|| dsn.strip_prefix("sqlite:"))
            .unwrap_or(dsn);
        PathBuf::from(stripped)
    }

    /// Create the download and log directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.download_dir).with_context(|| {
            format!("creating download directory {}", self.download_dir.display())
        })?;
        if let Some(parent) = self.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating data directory {}", parent.display()))?;
            }
        }
        Ok(())
    }

    pub fn database_exists(&self) -> bool {
        Path::new(&self.database_path).exists()
    }
}
