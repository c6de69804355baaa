//! Throttled, change-detected pipeline status rendering.
//!
//! Renders a block of lines every tick, emits only when the content changed
//! (and at least every 30 seconds), and always appends; historical output is
//! never overwritten.

use std::time::{Duration, Instant};

use super::progress::PipelineSnapshot;
use crate::utils::{format_duration, format_size};

/// Render interval.
pub const TICK: Duration = Duration::from_secs(2);
/// Emit at least this often even without changes.
pub const FORCE_EMIT: Duration = Duration::from_secs(30);

const MAX_ACTIVE_DOWNLOADS_SHOWN: usize = 5;
const MAX_ACTIVE_UPLOADS_SHOWN: usize = 3;

/// Render the snapshot body used for change detection. Excludes the clock
/// and per-item elapsed times so an idle pipeline produces identical bodies
/// tick after tick.
pub fn render_body(snapshot: &PipelineSnapshot) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Overall: {}% ({}/{} items)\n",
        snapshot.percent(),
        snapshot.completed_items(),
        snapshot.total_items(),
    ));

    if !snapshot.status_line.is_empty() {
        out.push_str(&format!("Status: {}\n", snapshot.status_line));
    }

    for (url, progress) in snapshot.downloads_active.iter().take(MAX_ACTIVE_DOWNLOADS_SHOWN) {
        let size = match progress.bytes_total {
            Some(total) => format!(
                "{} / {}",
                format_size(progress.bytes_read),
                format_size(total)
            ),
            None => format_size(progress.bytes_read),
        };
        out.push_str(&format!(
            "  ↓ [w{}] {} — {} ({})\n",
            progress.worker, progress.title, size, url
        ));
    }
    for (url, progress) in snapshot.uploads_active.iter().take(MAX_ACTIVE_UPLOADS_SHOWN) {
        out.push_str(&format!(
            "  ↑ [w{}] {} — {} ({})\n",
            progress.worker, progress.title, progress.status, url
        ));
    }

    out.push_str(&format!(
        "{:<10} {:>7} {:>7} {:>10} {:>8}\n",
        "Stage", "Active", "Queued", "Completed", "Workers"
    ));
    out.push_str(&format!(
        "{:<10} {:>7} {:>7} {:>10} {:>8}\n",
        "Download",
        snapshot.downloads_active.len(),
        snapshot.downloads_queued,
        snapshot.downloads_completed,
        snapshot.download_workers,
    ));
    out.push_str(&format!(
        "{:<10} {:>7} {:>7} {:>10} {:>8}\n",
        "Upload",
        snapshot.uploads_active.len(),
        snapshot.uploads_queued,
        snapshot.uploads_completed,
        snapshot.upload_workers,
    ));

    out
}

/// Build the full emitted block: timer header plus body.
pub fn render_block(snapshot: &PipelineSnapshot) -> String {
    let eta = match snapshot.eta_secs() {
        Some(secs) => format_duration(secs),
        None => "--:--".to_string(),
    };
    format!(
        "──────── pipeline ── elapsed {} ── eta {} ────────\n{}",
        format_duration(snapshot.elapsed_secs),
        eta,
        render_body(snapshot),
    )
}

/// Tracks the previous emission for change detection.
pub struct DashboardState {
    last_body: Option<String>,
    last_emit: Instant,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            last_body: None,
            last_emit: Instant::now(),
        }
    }

    /// Decide whether to emit this tick; updates internal state when the
    /// answer is yes.
    pub fn should_emit(&mut self, body: &str) -> bool {
        let changed = self.last_body.as_deref() != Some(body);
        let stale = self.last_emit.elapsed() >= FORCE_EMIT;
        if changed || stale {
            self.last_body = Some(body.to_string());
            self.last_emit = Instant::now();
            true
        } else {
            false
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::{Stage, WorkProgress};

    fn snapshot() -> PipelineSnapshot {
        PipelineSnapshot {
            status_line: "scanning alpha".to_string(),
            downloads_active: vec![(
                "https://example/post/X1".to_string(),
                WorkProgress::new(Stage::Download, 0, "A"),
            )],
            uploads_active: vec![],
            downloads_queued: 2,
            uploads_queued: 0,
            downloads_completed: 1,
            uploads_completed: 0,
            download_workers: 3,
            upload_workers: 2,
            uploads_enabled: true,
            elapsed_secs: 61,
        }
    }

    #[test]
    fn test_body_contains_table_and_active_items() {
        let body = render_body(&snapshot());
        assert!(body.contains("Status: scanning alpha"));
        assert!(body.contains("[w0] A"));
        assert!(body.contains("Download"));
        assert!(body.contains("Upload"));
    }

    #[test]
    fn test_body_is_deterministic_for_unchanged_state() {
        let s = snapshot();
        assert_eq!(render_body(&s), render_body(&s));
    }

    #[test]
    fn test_block_has_timer_header() {
        let block = render_block(&snapshot());
        assert!(block.contains("elapsed 01:01"));
    }

    #[test]
    fn test_should_emit_dedupes_identical_bodies() {
        let mut state = DashboardState::new();
        assert!(state.should_emit("body"));
        assert!(!state.should_emit("body"));
        assert!(state.should_emit("different"));
    }

    #[test]
    fn test_active_downloads_capped_at_five() {
        let mut s = snapshot();
        s.downloads_active = (0..8)
            .map(|i| {
                (
                    format!("https://example/post/X{}", i),
                    WorkProgress::new(Stage::Download, i, &format!("T{}", i)),
                )
            })
            .collect();
        let body = render_body(&s);
        assert_eq!(body.matches("↓ [w").count(), 5);
    }
}
