//! Streaming media downloads with atomic finalization.
//!
//! Bytes stream into `<final>.tmp` and the temp file is renamed only after
//! the advertised length checks out, so readers never observe a partial
//! final file. A 404 means the time-limited media URL expired, not that the
//! post is gone; the engine refreshes the URL through the resolver and
//! retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::fetch::MediaUrlResolver;
use crate::models::Video;
use crate::repository::VideoRepository;
use crate::utils::video_file_name;

/// Stream copy buffer size.
const CHUNK_BUFFER: usize = 8 * 1024;

/// Minimum plausible size for a finished media file.
const MIN_VALID_SIZE: u64 = 1024;

/// How many times an expired URL is refreshed before the item is abandoned.
const REFRESH_RETRIES: u32 = 2;

/// Per-chunk progress callback: (bytes read so far, advertised total).
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("media URL expired (404)")]
    UrlExpired,
    #[error("media URL refresh exhausted")]
    RefreshFailed,
    #[error("no media source URL on record")]
    NoMediaUrl,
    #[error("HTTP {0}")]
    Http(reqwest::StatusCode),
    #[error("size mismatch: expected {expected}, wrote {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("resolver error: {0}")]
    Resolve(anyhow::Error),
}

impl From<anyhow::Error> for DownloadError {
    fn from(e: anyhow::Error) -> Self {
        DownloadError::Resolve(e)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest surfaces some 404s as errors after error_for_status-style
        // handling upstream; keep treating them as expiry.
        if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            DownloadError::UrlExpired
        } else {
            DownloadError::Transport(e)
        }
    }
}

/// Downloads one video at a time; concurrency comes from the orchestrator
/// invoking distinct items on distinct workers.
pub struct DownloadEngine {
    client: reqwest::Client,
    videos: Arc<VideoRepository>,
    resolver: Arc<dyn MediaUrlResolver>,
    download_dir: PathBuf,
    user_agent: String,
}

impl DownloadEngine {
    pub fn new(
        videos: Arc<VideoRepository>,
        resolver: Arc<dyn MediaUrlResolver>,
        download_dir: PathBuf,
        user_agent: String,
    ) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            videos,
            resolver,
            download_dir,
            user_agent,
        })
    }

    /// Download a video to `<dir>/<safe_title>_<post_id><ext>`.
    ///
    /// Idempotent for already-present valid files: those are reconciled in
    /// the store without issuing a GET. Returns the final path.
    pub async fn download(
        &self,
        video: &Video,
        progress: ProgressFn<'_>,
    ) -> Result<PathBuf, DownloadError> {
        let mut media_url = video
            .media_source_url
            .clone()
            .ok_or(DownloadError::NoMediaUrl)?;

        let mut refreshes = 0u32;
        loop {
            let final_path = self
                .download_dir
                .join(video_file_name(&video.title, &video.post_id, &media_url));

            if tokio::fs::try_exists(&final_path).await? {
                if self.validate_existing(&final_path, &media_url).await? {
                    info!(path = %final_path.display(), "existing file valid, reconciling");
                    self.videos
                        .mark_downloaded(&video.url, &final_path.to_string_lossy())?;
                    return Ok(final_path);
                }
                warn!(path = %final_path.display(), "existing file invalid, re-downloading");
                tokio::fs::remove_file(&final_path).await?;
            }

            match self.stream_to_file(&media_url, &final_path, progress).await {
                Ok(()) => {
                    self.videos
                        .mark_downloaded(&video.url, &final_path.to_string_lossy())?;
                    info!(path = %final_path.display(), "download complete");
                    return Ok(final_path);
                }
                Err(DownloadError::UrlExpired) => {
                    if refreshes >= REFRESH_RETRIES {
                        warn!(url = %video.url, "media URL refresh exhausted");
                        return Err(DownloadError::RefreshFailed);
                    }
                    refreshes += 1;
                    debug!(url = %video.url, attempt = refreshes, "refreshing expired media URL");
                    match self.resolver.resolve_media_url(&video.url).await? {
                        Some(fresh) => {
                            self.videos.update_media_url(&video.url, &fresh)?;
                            media_url = fresh;
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => return Err(DownloadError::RefreshFailed),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate a pre-existing file against the media URL.
    ///
    /// Valid when it is at least 1 KiB and, if the server advertises a
    /// content length, within 1% of it. Without a content length the file
    /// passes if its first and last byte are readable.
    async fn validate_existing(&self, path: &Path, media_url: &str) -> Result<bool, DownloadError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size < MIN_VALID_SIZE {
            return Ok(false);
        }

        // Read the advertised length from the header: HEAD responses carry
        // no body, so the body-derived length is always zero.
        let remote_len = match self
            .client
            .head(media_url)
            .headers(self.browser_headers())
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok()),
            _ => None,
        };

        if let Some(expected) = remote_len {
            let tolerance = expected / 100;
            let diff = size.abs_diff(expected);
            return Ok(diff <= tolerance);
        }

        // No length to compare against: probe that the file is readable
        // end to end.
        let path = path.to_path_buf();
        let readable = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = std::fs::File::open(&path)?;
            let mut byte = [0u8; 1];
            file.read_exact(&mut byte)?;
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut byte)?;
            Ok(true)
        })
        .await
        .map_err(|e| std::io::Error::other(e))?;

        Ok(readable.unwrap_or(false))
    }

    /// Stream the response body to `<final>.tmp`, verify the advertised
    /// length, and atomically rename into place.
    async fn stream_to_file(
        &self,
        media_url: &str,
        final_path: &Path,
        progress: ProgressFn<'_>,
    ) -> Result<(), DownloadError> {
        let resp = self
            .client
            .get(media_url)
            .headers(self.browser_headers())
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::UrlExpired);
        }
        if !status.is_success() {
            return Err(DownloadError::Http(status));
        }

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = PathBuf::from(format!("{}.tmp", final_path.display()));
        let expected = resp.content_length();

        let result = self
            .write_stream(resp, &tmp_path, expected, progress)
            .await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp_path, final_path).await?;
        Ok(())
    }

    async fn write_stream(
        &self,
        resp: reqwest::Response,
        tmp_path: &Path,
        expected: Option<u64>,
        progress: ProgressFn<'_>,
    ) -> Result<(), DownloadError> {
        let file = tokio::fs::File::create(tmp_path).await?;
        let mut writer = BufWriter::with_capacity(CHUNK_BUFFER, file);
        let mut stream = resp.bytes_stream();
        let mut read = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            read += chunk.len() as u64;
            progress(read, expected);
        }
        writer.flush().await?;

        if let Some(expected) = expected {
            if read != expected {
                return Err(DownloadError::SizeMismatch {
                    expected,
                    actual: read,
                });
            }
        }
        Ok(())
    }

    /// Realistic browser headers for CDN compatibility.
    fn browser_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if let Ok(ua) = header::HeaderValue::from_str(&self.user_agent) {
            headers.insert(header::USER_AGENT, ua);
        }
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "video/webm,video/ogg,video/*;q=0.9,application/ogg;q=0.7,audio/*;q=0.6,*/*;q=0.5",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert("Sec-Fetch-Dest", header::HeaderValue::from_static("video"));
        headers.insert("Sec-Fetch-Mode", header::HeaderValue::from_static("no-cors"));
        headers.insert(
            "Sec-Fetch-Site",
            header::HeaderValue::from_static("cross-site"),
        );
        headers.insert(
            header::CONNECTION,
            header::HeaderValue::from_static("keep-alive"),
        );
        headers
    }
}
