//! Scan command: one-shot full scan of a single channel.

use std::time::Duration;

use anyhow::{bail, Result};
use console::style;
use tracing::warn;

use super::Runtime;
use crate::config::Settings;
use crate::fetch::MediaUrlResolver;
use crate::models::Video;
use crate::scanner::ScanMode;

pub async fn cmd_scan(settings: &Settings, channel: &str, limit: usize) -> Result<()> {
    let runtime = Runtime::build(settings)?;
    runtime.install_signal_handler();

    let channel_url = resolve_channel_url(&runtime, channel)?;
    println!(
        "{} Full scan of {} (limit {})",
        style("→").cyan(),
        channel_url,
        limit
    );

    let candidates = runtime
        .scanner
        .scan(&channel_url, limit, ScanMode::Full)
        .await?;
    println!("{} {} candidates found", style("→").cyan(), candidates.len());

    let mut new = 0usize;
    for candidate in &candidates {
        if runtime.cancel.is_cancelled() {
            break;
        }
        if runtime.videos.exists(&candidate.url)? {
            continue;
        }
        let video = Video::discovered(
            candidate.url.clone(),
            candidate.title.clone(),
            candidate.post_id.clone(),
        );
        runtime.videos.upsert(std::slice::from_ref(&video))?;
        new += 1;

        match runtime.fetcher.resolve_media_url(&video.url).await {
            Ok(Some(media_url)) => runtime.videos.update_media_url(&video.url, &media_url)?,
            Ok(None) => warn!(url = %video.url, "no media URL observed"),
            Err(e) => warn!(url = %video.url, error = %e, "media resolution failed"),
        }

        // Full scans pace their per-post work.
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    println!("{} {} new posts persisted", style("✓").green(), new);

    let pending = runtime.videos.get_undownloaded()?;
    if pending.is_empty() {
        println!("{} Nothing to download", style("·").dim());
    } else {
        println!(
            "{} Processing {} downloads...",
            style("→").cyan(),
            pending.len()
        );
        runtime.pipeline.start().await;
        runtime.pipeline.process_blocking(pending).await;
        runtime.pipeline.stop().await;
    }

    runtime.sessions.shutdown().await;
    Ok(())
}

/// Accept either a listing URL or the name of a stored channel.
fn resolve_channel_url(runtime: &Runtime, reference: &str) -> Result<String> {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        return Ok(reference.to_string());
    }
    for channel in runtime.channels.get_all()? {
        if channel.name == reference {
            return Ok(channel.url);
        }
    }
    bail!("no channel named '{}' in the store", reference)
}
