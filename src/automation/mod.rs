//! Automation loop: polls active channels on their schedule, discovers new
//! posts, resolves media URLs, and hands work to the pipeline without ever
//! waiting on downloads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fetch::MediaUrlResolver;
use crate::models::Video;
use crate::pipeline::Pipeline;
use crate::repository::{ChannelRepository, VideoRepository};
use crate::scanner::{ChannelSource, ScanMode};

/// Candidates pulled per channel per monitoring cycle.
const MONITOR_LIMIT: usize = 20;
/// Pause between scanning consecutive due channels.
const CHANNEL_DELAY: Duration = Duration::from_secs(2);

pub struct AutomationLoop {
    channels: Arc<ChannelRepository>,
    videos: Arc<VideoRepository>,
    scanner: Arc<dyn ChannelSource>,
    resolver: Arc<dyn MediaUrlResolver>,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
    cycle_delay: Duration,
}

impl AutomationLoop {
    pub fn new(
        channels: Arc<ChannelRepository>,
        videos: Arc<VideoRepository>,
        scanner: Arc<dyn ChannelSource>,
        resolver: Arc<dyn MediaUrlResolver>,
        pipeline: Arc<Pipeline>,
        cancel: CancellationToken,
        cycle_delay: Duration,
    ) -> Self {
        Self {
            channels,
            videos,
            scanner,
            resolver,
            pipeline,
            cancel,
            cycle_delay,
        }
    }

    /// Run until cancelled.
    pub async fn run(&self) -> Result<()> {
        info!("automation loop started");
        while !self.cancel.is_cancelled() {
            self.run_cycle().await;
            if !self.sleep(self.cycle_delay).await {
                break;
            }
        }
        info!("automation loop stopped");
        Ok(())
    }

    /// One scheduling pass: scan due channels, ingest their candidates,
    /// and enqueue everything downloadable.
    pub async fn run_cycle(&self) {
        let channels = match self.channels.get_active() {
            Ok(channels) => channels,
            Err(e) => {
                // Transient store errors skip the cycle, never kill the loop.
                warn!(error = %e, "failed to read channels, skipping cycle");
                return;
            }
        };

        let now = chrono::Utc::now();
        let due: Vec<_> = channels.into_iter().filter(|c| c.is_due(now)).collect();
        if due.is_empty() {
            let idle = rand::rng().random_range(30..=60u64);
            self.sleep(Duration::from_secs(idle)).await;
            return;
        }

        for channel in due {
            if self.cancel.is_cancelled() {
                return;
            }
            self.pipeline
                .update_status(&format!("scanning {}", channel.name));

            match self
                .scanner
                .scan(&channel.url, MONITOR_LIMIT, ScanMode::Monitor)
                .await
            {
                Ok(candidates) => {
                    let new = self.ingest_candidates(candidates).await;
                    if new > 0 {
                        info!(channel = %channel.name, new, "discovered new posts");
                    }
                }
                Err(e) => warn!(channel = %channel.name, error = %e, "channel scan failed"),
            }

            // One touch per due channel per cycle, found posts or not.
            if let Err(e) = self.channels.touch_last_checked(channel.id) {
                warn!(channel = %channel.name, error = %e, "failed to update last_checked");
            }

            if !self.sleep(CHANNEL_DELAY).await {
                return;
            }
        }

        // Hand everything downloadable to the pipeline; scanning never waits
        // on downloads.
        match self.videos.get_undownloaded() {
            Ok(pending) => {
                if !pending.is_empty() {
                    let added = self.pipeline.enqueue(pending).await;
                    if added > 0 {
                        info!(added, "enqueued pending downloads");
                    }
                }
            }
            Err(e) => warn!(error = %e, "failed to read pending downloads"),
        }
    }

    /// Persist unseen candidates and resolve their media URLs. Returns the
    /// number of new posts.
    async fn ingest_candidates(&self, candidates: Vec<crate::scanner::PostCandidate>) -> usize {
        let mut new = 0;
        for candidate in candidates {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.videos.exists(&candidate.url) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "exists check failed, skipping");
                    continue;
                }
            }

            let video = Video::discovered(
                candidate.url.clone(),
                candidate.title.clone(),
                candidate.post_id.clone(),
            );
            if let Err(e) = self.videos.upsert(std::slice::from_ref(&video)) {
                warn!(url = %video.url, error = %e, "failed to persist post, skipping");
                continue;
            }
            new += 1;

            match self.resolver.resolve_media_url(&video.url).await {
                Ok(Some(media_url)) => {
                    if let Err(e) = self.videos.update_media_url(&video.url, &media_url) {
                        warn!(url = %video.url, error = %e, "failed to persist media URL");
                    }
                }
                Ok(None) => {
                    warn!(url = %video.url, "no media URL observed for post");
                }
                Err(e) => {
                    warn!(url = %video.url, error = %e, "media resolution failed");
                }
            }
        }
        new
    }

    /// Cancellation-aware sleep. Returns false when cancelled.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
