//! Media probing and thumbnail grid generation via ffprobe/ffmpeg.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use rand::Rng;
use tokio::process::Command;
use tracing::{debug, warn};

/// Frame grid dimensions: 2 columns by 5 rows.
const GRID_COLS: u32 = 2;
const GRID_ROWS: u32 = 5;
const FRAME_COUNT: usize = (GRID_COLS * GRID_ROWS) as usize;
const FRAME_WIDTH: u32 = 160;

/// Keep sampled timestamps this far from the start and end of playback.
const EDGE_MARGIN_SECS: f64 = 5.0;

/// Probed media metadata. Every field is required for an upload.
#[derive(Debug, Clone, Copy)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

/// Probe a media file with ffprobe. Fails if any value is missing or
/// unparseable.
pub async fn probe_media(path: &Path) -> Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .args(["-v", "error"])
        .args(["-print_format", "json"])
        .args(["-show_streams", "-show_format"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .context("spawning ffprobe")?;

    if !output.status.success() {
        bail!("ffprobe failed for {}", path.display());
    }

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).context("parsing ffprobe output")?;

    let streams = parsed["streams"]
        .as_array()
        .ok_or_else(|| anyhow!("no streams in probe output"))?;
    let video_stream = streams
        .iter()
        .find(|s| s["width"].is_u64() && s["height"].is_u64())
        .ok_or_else(|| anyhow!("no video stream in {}", path.display()))?;

    let width = video_stream["width"]
        .as_u64()
        .ok_or_else(|| anyhow!("missing width"))? as u32;
    let height = video_stream["height"]
        .as_u64()
        .ok_or_else(|| anyhow!("missing height"))? as u32;
    let duration_seconds = parsed["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| anyhow!("missing duration"))?;
    let size_bytes = tokio::fs::metadata(path).await?.len();

    Ok(MediaInfo {
        width,
        height,
        duration_seconds,
        size_bytes,
    })
}

/// Root for ephemeral thumbnail artifacts.
pub fn thumbs_dir() -> PathBuf {
    std::env::temp_dir().join("scraper-thumbs")
}

/// Timestamps to sample for the preview grid: random instants bounded away
/// from the first and last 5 seconds, falling back to an even spread for
/// clips too short to honor the margin.
fn sample_timestamps(duration: f64, count: usize) -> Vec<f64> {
    let mut rng = rand::rng();
    let lo = EDGE_MARGIN_SECS;
    let hi = duration - EDGE_MARGIN_SECS;

    if hi > lo {
        let mut stamps: Vec<f64> = (0..count).map(|_| rng.random_range(lo..hi)).collect();
        stamps.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        stamps
    } else {
        // Short clip: spread evenly across what there is.
        let step = duration / (count as f64 + 1.0);
        (1..=count).map(|i| step * i as f64).collect()
    }
}

/// Extract up to 10 still frames, scale each to width 160, and compose a
/// 2x5 grid JPEG. Returns the path of the composite; the caller deletes it
/// after the upload.
pub async fn generate_thumbnail_grid(
    media_path: &Path,
    duration: f64,
    post_id: &str,
) -> Result<PathBuf> {
    let root = thumbs_dir();
    let frames_dir = root.join(format!("frames_{}", post_id));
    tokio::fs::create_dir_all(&frames_dir).await?;

    let mut frame_paths = Vec::new();
    for (i, stamp) in sample_timestamps(duration, FRAME_COUNT).into_iter().enumerate() {
        let frame_path = frames_dir.join(format!("frame_{:02}.jpg", i));
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-ss", &format!("{:.2}", stamp)])
            .arg("-i")
            .arg(media_path)
            .args(["-an", "-sn"])
            .args(["-frames:v", "1"])
            .args(["-vf", &format!("scale={}:-2", FRAME_WIDTH)])
            .args(["-q:v", "4"])
            .arg("-y")
            .arg(&frame_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("spawning ffmpeg")?;

        if output.status.success() && frame_path.exists() {
            frame_paths.push(frame_path);
        } else {
            debug!(stamp, "frame extraction failed, skipping timestamp");
        }
    }

    let composite = compose_grid(&frame_paths, &root, post_id);
    let _ = tokio::fs::remove_dir_all(&frames_dir).await;
    composite
}

fn compose_grid(frame_paths: &[PathBuf], root: &Path, post_id: &str) -> Result<PathBuf> {
    if frame_paths.is_empty() {
        bail!("no frames extracted for thumbnail grid");
    }

    let mut frames = Vec::new();
    for path in frame_paths {
        match image::ImageReader::open(path).and_then(|r| {
            r.decode()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        }) {
            Ok(img) => frames.push(img),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping undecodable frame"),
        }
    }
    let first = frames.first().ok_or_else(|| anyhow!("no decodable frames"))?;
    let (fw, fh) = (first.width(), first.height());

    let mut grid = image::RgbaImage::new(GRID_COLS * fw, GRID_ROWS * fh);
    for (i, frame) in frames.iter().enumerate().take(FRAME_COUNT) {
        let cell = image::imageops::resize(frame, fw, fh, image::imageops::FilterType::Triangle);
        let col = (i as u32) % GRID_COLS;
        let row = (i as u32) / GRID_COLS;
        image::imageops::overlay(&mut grid, &cell, (col * fw) as i64, (row * fh) as i64);
    }

    let out_path = root.join(format!("thumb_{}.jpg", post_id));
    image::DynamicImage::ImageRgba8(grid)
        .to_rgb8()
        .save(&out_path)
        .context("writing thumbnail grid")?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_timestamps_respect_edges() {
        let stamps = sample_timestamps(120.0, 10);
        assert_eq!(stamps.len(), 10);
        for stamp in stamps {
            assert!(stamp >= 5.0 && stamp <= 115.0);
        }
    }

    #[test]
    fn test_sample_timestamps_short_clip() {
        let stamps = sample_timestamps(6.0, 10);
        assert_eq!(stamps.len(), 10);
        for stamp in stamps {
            assert!(stamp > 0.0 && stamp < 6.0);
        }
    }

    #[test]
    fn test_compose_grid_requires_frames() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compose_grid(&[], dir.path(), "X1").is_err());
    }
}
