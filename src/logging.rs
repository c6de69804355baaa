//! Append-only daily event log.
//!
//! Every status and pipeline event is mirrored to
//! `<download_dir>/logs/scraper_YYYY-MM-DD.log` with ISO-8601 timestamps.
//! The file rolls when the local date changes. Diagnostics still go through
//! `tracing`; this log is the durable operator-facing record.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::warn;

pub struct EventLog {
    logs_dir: PathBuf,
    state: Mutex<Option<(String, File)>>,
}

impl EventLog {
    /// Create the event log under `<download_dir>/logs/`.
    pub fn new(download_dir: &Path) -> Result<Self> {
        let logs_dir = download_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("creating log directory {}", logs_dir.display()))?;
        Ok(Self {
            logs_dir,
            state: Mutex::new(None),
        })
    }

    /// Append a message. Multi-line messages get one timestamped line each.
    /// Logging failures are reported via tracing and otherwise swallowed;
    /// the pipeline never stops over its own log file.
    pub fn log(&self, message: &str) {
        if let Err(e) = self.write(message) {
            warn!(error = %e, "event log write failed");
        }
    }

    fn write(&self, message: &str) -> Result<()> {
        let now = Local::now();
        let date = now.format("%Y-%m-%d").to_string();
        let timestamp = now.to_rfc3339();

        let mut guard = self.state.lock().unwrap();
        let needs_open = match guard.as_ref() {
            Some((open_date, _)) => *open_date != date,
            None => true,
        };
        if needs_open {
            let path = self.logs_dir.join(format!("scraper_{}.log", date));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            *guard = Some((date, file));
        }

        if let Some((_, file)) = guard.as_mut() {
            for line in message.lines() {
                writeln!(file, "[{}] {}", timestamp, line)?;
            }
        }
        Ok(())
    }

    /// Path of today's log file.
    pub fn current_path(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d").to_string();
        self.logs_dir.join(format!("scraper_{}.log", date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path()).unwrap();

        log.log("first event");
        log.log("line one\nline two");

        let contents = std::fs::read_to_string(log.current_path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("first event"));
        assert!(lines[2].ends_with("line two"));
    }

    #[test]
    fn test_log_file_named_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path()).unwrap();
        log.log("event");
        let name = log.current_path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("scraper_"));
        assert!(name.ends_with(".log"));
    }
}
