//! Channel scanning: pagination walk and candidate discovery.

mod extract;

pub use extract::{extract_candidates, extract_post_id, page_url, total_pages, PostCandidate};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use crate::config::SiteProfile;
use crate::fetch::PageFetcher;

/// Source of post candidates for a channel. The automation loop consumes
/// this seam; `ChannelScanner` is the production implementation.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn scan(
        &self,
        channel_url: &str,
        limit: usize,
        mode: ScanMode,
    ) -> Result<Vec<PostCandidate>>;
}

/// How deep a scan walks the channel's listing pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Periodic monitoring: pages capped at the configured monitor cap.
    Monitor,
    /// Full scan: walk every listing page.
    Full,
}

/// Walks a channel's paged listings and returns new post candidates in
/// discovery order. Never touches the media resolver.
pub struct ChannelScanner {
    fetcher: Arc<PageFetcher>,
    site: SiteProfile,
}

impl ChannelScanner {
    pub fn new(fetcher: Arc<PageFetcher>, site: SiteProfile) -> Self {
        Self { fetcher, site }
    }

    /// Scan up to `limit` candidates from a channel, deduplicated by URL.
    pub async fn scan(
        &self,
        channel_url: &str,
        limit: usize,
        mode: ScanMode,
    ) -> Result<Vec<PostCandidate>> {
        let first_page = self.fetcher.fetch_html(channel_url).await?;
        let pages = total_pages(&first_page, self.site.page_size);
        let page_cap = match mode {
            ScanMode::Monitor => pages.min(self.site.monitor_page_cap),
            ScanMode::Full => pages,
        };
        debug!(%channel_url, pages, page_cap, "starting channel scan");

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        self.collect(&first_page, channel_url, &mut seen, &mut candidates);

        for page in 2..=page_cap {
            if candidates.len() >= limit {
                break;
            }
            // Politeness delay between listing pages.
            let wait = rand::rng().random_range(1500..=2000u64);
            tokio::time::sleep(Duration::from_millis(wait)).await;

            let url = page_url(channel_url, page, self.site.page_size);
            let html = self.fetcher.fetch_html(&url).await?;
            self.collect(&html, channel_url, &mut seen, &mut candidates);
        }

        candidates.truncate(limit);
        info!(%channel_url, count = candidates.len(), "channel scan finished");
        Ok(candidates)
    }

    fn collect(
        &self,
        html: &str,
        channel_url: &str,
        seen: &mut HashSet<String>,
        out: &mut Vec<PostCandidate>,
    ) {
        for candidate in extract_candidates(html, channel_url, &self.site.post_path_marker) {
            if seen.insert(candidate.url.clone()) {
                out.push(candidate);
            }
        }
    }
}

#[async_trait]
impl ChannelSource for ChannelScanner {
    async fn scan(
        &self,
        channel_url: &str,
        limit: usize,
        mode: ScanMode,
    ) -> Result<Vec<PostCandidate>> {
        ChannelScanner::scan(self, channel_url, limit, mode).await
    }
}
