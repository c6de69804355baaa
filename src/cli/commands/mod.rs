//! Command implementations.

pub mod channel;
pub mod init;
pub mod run;
pub mod scan;
pub mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::download::DownloadEngine;
use crate::fetch::PageFetcher;
use crate::logging::EventLog;
use crate::pipeline::Pipeline;
use crate::repository::{ChannelRepository, VideoRepository};
use crate::scanner::ChannelScanner;
use crate::solver::{SessionManager, USER_AGENTS};
use crate::upload::DeliveryUploader;

/// Everything a pipeline-driving command needs, wired together.
pub(crate) struct Runtime {
    pub channels: Arc<ChannelRepository>,
    pub videos: Arc<VideoRepository>,
    pub sessions: Arc<SessionManager>,
    pub fetcher: Arc<PageFetcher>,
    pub scanner: ChannelScanner,
    pub pipeline: Arc<Pipeline>,
    pub cancel: CancellationToken,
}

impl Runtime {
    pub fn build(settings: &Settings) -> Result<Self> {
        settings.ensure_dirs()?;

        let channels = Arc::new(
            ChannelRepository::new(&settings.database_path).context("opening channel store")?,
        );
        let videos = Arc::new(
            VideoRepository::new(&settings.database_path).context("opening video store")?,
        );
        let event_log = Arc::new(EventLog::new(&settings.download_dir)?);

        let sessions = Arc::new(SessionManager::new(&settings.solver_url, settings.session_ttl));
        let fetcher = Arc::new(PageFetcher::new(sessions.clone(), settings.site.clone()));
        let scanner = ChannelScanner::new(fetcher.clone(), settings.site.clone());

        let engine = DownloadEngine::new(
            videos.clone(),
            fetcher.clone(),
            settings.download_dir.clone(),
            USER_AGENTS[0].to_string(),
        )?;
        let uploader = settings
            .delivery
            .clone()
            .map(|delivery| {
                DeliveryUploader::new(videos.clone(), delivery, settings.download_dir.clone())
            })
            .transpose()?;

        let cancel = CancellationToken::new();
        let pipeline = Arc::new(Pipeline::new(
            engine,
            uploader,
            videos.clone(),
            event_log,
            settings.download_workers,
            settings.upload_workers,
            cancel.clone(),
        ));

        Ok(Self {
            channels,
            videos,
            sessions,
            fetcher,
            scanner,
            pipeline,
            cancel,
        })
    }

    /// Cancel on Ctrl-C.
    pub fn install_signal_handler(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }
}
