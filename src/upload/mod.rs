//! Delivery of downloaded media to the messaging upload API.
//!
//! A failed upload only records the attempt timestamp; the item stays in
//! its downloaded state and is retried on a later cycle.

mod probe;

pub use probe::{generate_thumbnail_grid, probe_media, thumbs_dir, MediaInfo};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::models::Video;
use crate::repository::VideoRepository;
use crate::utils::{escape_markdown, format_duration, format_size};

/// Attempts for reading media bytes off disk, with doubling backoff.
const READ_ATTEMPTS: u32 = 5;
const READ_BACKOFF_START: Duration = Duration::from_secs(1);

/// Delivery endpoint settings; uploads are enabled only when all three
/// values are configured.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub token: String,
    pub chat_id: String,
    pub base_url: String,
}

/// Uploads one downloaded video per call to the messaging API.
pub struct DeliveryUploader {
    client: reqwest::Client,
    videos: Arc<VideoRepository>,
    settings: DeliverySettings,
    download_dir: PathBuf,
    message_id_re: Regex,
}

impl DeliveryUploader {
    pub fn new(
        videos: Arc<VideoRepository>,
        settings: DeliverySettings,
        download_dir: PathBuf,
    ) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()?,
            videos,
            settings,
            download_dir,
            message_id_re: Regex::new(r#""message_id"\s*:\s*(\d+)"#)
                .context("compiling message id pattern")?,
        })
    }

    /// Upload a downloaded video. On any failure the attempt timestamp is
    /// recorded and the error returned; upload state is only set on a 2xx
    /// response from the endpoint.
    pub async fn upload(&self, video: &Video) -> Result<()> {
        match self.upload_inner(video).await {
            Ok(message_id) => {
                self.videos
                    .mark_uploaded(&video.url, message_id.as_deref())?;
                info!(url = %video.url, message_id = ?message_id, "upload complete");
                Ok(())
            }
            Err(e) => {
                self.videos.touch_upload_attempt(&video.url)?;
                Err(e)
            }
        }
    }

    async fn upload_inner(&self, video: &Video) -> Result<Option<String>> {
        let media_path = self.resolve_media_path(video).await?;

        let info = probe::probe_media(&media_path)
            .await
            .with_context(|| format!("probing {}", media_path.display()))?;

        let thumb_path =
            probe::generate_thumbnail_grid(&media_path, info.duration_seconds, &video.post_id)
                .await
                .context("generating thumbnail grid")?;

        let result = self
            .send_video(video, &media_path, &thumb_path, &info)
            .await;

        // The composite is ephemeral regardless of outcome.
        let _ = tokio::fs::remove_file(&thumb_path).await;

        result
    }

    /// Resolve the on-disk file, falling back to a directory search by post
    /// id when the recorded path has moved.
    async fn resolve_media_path(&self, video: &Video) -> Result<PathBuf> {
        if let Some(path) = &video.download_path {
            let path = PathBuf::from(path);
            if tokio::fs::try_exists(&path).await? {
                return Ok(path);
            }
            warn!(path = %path.display(), "recorded download path missing, searching");
        }

        let mut entries = tokio::fs::read_dir(&self.download_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(&video.post_id) && !name.ends_with(".tmp") {
                debug!(file = %name, "adopted file found by post id");
                return Ok(entry.path());
            }
        }
        bail!("no media file on disk for {}", video.url)
    }

    /// Read the media bytes with backoff, verifying the read length against
    /// the file's stat length.
    async fn read_media(&self, path: &Path) -> Result<Vec<u8>> {
        let expected = tokio::fs::metadata(path).await?.len();
        let mut delay = READ_BACKOFF_START;
        let mut last_err = None;

        for attempt in 1..=READ_ATTEMPTS {
            match tokio::fs::read(path).await {
                Ok(bytes) if bytes.len() as u64 == expected => return Ok(bytes),
                Ok(bytes) => {
                    last_err = Some(anyhow!(
                        "short read: {} of {} bytes",
                        bytes.len(),
                        expected
                    ));
                }
                Err(e) => last_err = Some(e.into()),
            }
            if attempt < READ_ATTEMPTS {
                debug!(attempt, ?delay, "media read failed, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("media read failed")))
    }

    async fn send_video(
        &self,
        video: &Video,
        media_path: &Path,
        thumb_path: &Path,
        info: &MediaInfo,
    ) -> Result<Option<String>> {
        let media_bytes = self.read_media(media_path).await?;
        let thumb_bytes = tokio::fs::read(thumb_path).await?;

        let file_name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video.mp4".to_string());

        let caption = build_caption(&video.title, info);
        let duration = info.duration_seconds.round() as u64;

        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.settings.chat_id.clone())
            .part(
                "video",
                reqwest::multipart::Part::bytes(media_bytes)
                    .file_name(file_name)
                    .mime_str("video/mp4")?,
            )
            .text("caption", caption)
            .text("parse_mode", "Markdown")
            .text("duration", duration.to_string())
            .text("width", info.width.to_string())
            .text("height", info.height.to_string())
            .part(
                "thumb",
                reqwest::multipart::Part::bytes(thumb_bytes)
                    .file_name("thumb.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("supports_streaming", "true");

        let url = format!(
            "{}/bot{}/sendVideo",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.token
        );

        let resp = self.client.post(&url).multipart(form).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            bail!("delivery endpoint returned {}: {}", status, body);
        }
        Ok(self.parse_message_id(&body))
    }

    fn parse_message_id(&self, body: &str) -> Option<String> {
        self.message_id_re
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Caption: escaped title plus resolution, duration, and size.
fn build_caption(title: &str, info: &MediaInfo) -> String {
    format!(
        "*{}*\n{}x{} | {} | {}",
        escape_markdown(title),
        info.width,
        info.height,
        format_duration(info.duration_seconds.round() as u64),
        format_size(info.size_bytes),
    )
}
