//! Retry-wrapped page fetching and media URL resolution over the shared
//! solver session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::browser;
use crate::config::SiteProfile;
use crate::scanner::extract_post_id;
use crate::solver::SessionManager;

/// Delay between retries after a session renewal.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Seam used by the download engine to refresh expired media URLs.
#[async_trait]
pub trait MediaUrlResolver: Send + Sync {
    /// Resolve the direct media URL for a post page. `Ok(None)` means the
    /// resolution ran to completion but no matching request was observed.
    async fn resolve_media_url(&self, post_url: &str) -> Result<Option<String>>;
}

/// Fetches pages and resolves media URLs through the solver session,
/// renewing the session and retrying on failure.
pub struct PageFetcher {
    sessions: Arc<SessionManager>,
    site: SiteProfile,
    max_retries: u32,
}

impl PageFetcher {
    pub fn new(sessions: Arc<SessionManager>, site: SiteProfile) -> Self {
        Self {
            sessions,
            site,
            max_retries: 2,
        }
    }

    /// Fetch solved HTML for a URL. On failure the session is renewed and
    /// the fetch retried up to `max_retries` times.
    pub async fn fetch_html(&self, url: &str) -> Result<String> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(%url, attempt, "retrying page fetch after session renewal");
                if let Err(e) = self.sessions.renew().await {
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
                tokio::time::sleep(RETRY_DELAY).await;
            }
            match self.fetch_html_once(url).await {
                Ok(html) => return Ok(html),
                Err(e) => {
                    debug!(%url, error = %e, "page fetch failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("page fetch failed: {}", url)))
    }

    async fn fetch_html_once(&self, url: &str) -> Result<String> {
        let client = self.sessions.acquire().await?;
        let page = client
            .get_page(url)
            .await
            .with_context(|| format!("solving page {}", url))?;
        Ok(page.html)
    }

    async fn resolve_once(&self, post_url: &str) -> Result<Option<String>> {
        let post_id = extract_post_id(post_url, &self.site.post_path_marker)
            .ok_or_else(|| anyhow!("no post id in URL: {}", post_url))?;

        let client = self.sessions.acquire().await?;
        let page = client
            .get_page(post_url)
            .await
            .with_context(|| format!("solving post page {}", post_url))?;

        let captured = browser::sniff_media_url(
            post_url,
            &post_id,
            &page.cookies,
            &page.user_agent,
            &self.site,
        )
        .await?;

        match captured {
            Some(url) => Ok(Some(browser::follow_redirects(&url, &page.user_agent).await)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MediaUrlResolver for PageFetcher {
    async fn resolve_media_url(&self, post_url: &str) -> Result<Option<String>> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(%post_url, attempt, "retrying media resolution after session renewal");
                if let Err(e) = self.sessions.renew().await {
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
                tokio::time::sleep(RETRY_DELAY).await;
            }
            match self.resolve_once(post_url).await {
                // A clean run with no match is an answer, not an error.
                Ok(result) => return Ok(result),
                Err(e) => {
                    debug!(%post_url, error = %e, "media resolution failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("media resolution failed: {}", post_url)))
    }
}
