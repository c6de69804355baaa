//! Video repository.
//!
//! The post URL is the conflict key: re-discovering a post refreshes its
//! title, media URL, and discovery time without disturbing download state.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;

use super::{connect, parse_timestamp, Result};
use crate::models::Video;

/// SQLite-backed video repository.
pub struct VideoRepository {
    db_path: PathBuf,
}

impl VideoRepository {
    /// Create the repository, initializing the schema if needed.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<rusqlite::Connection> {
        connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS videos (
                url TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                post_id TEXT NOT NULL,
                media_source_url TEXT,
                downloaded INTEGER NOT NULL DEFAULT 0,
                download_path TEXT,
                downloaded_at TEXT,
                uploaded INTEGER NOT NULL DEFAULT 0,
                upload_message_id TEXT,
                last_upload_attempt_at TEXT,
                discovered_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_videos_downloaded ON videos(downloaded);
            CREATE INDEX IF NOT EXISTS idx_videos_uploaded ON videos(uploaded);
        "#,
        )?;
        Ok(())
    }

    fn row_to_video(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
        Ok(Video {
            url: row.get("url")?,
            title: row.get("title")?,
            post_id: row.get("post_id")?,
            media_source_url: row.get("media_source_url")?,
            downloaded: row.get::<_, i64>("downloaded")? != 0,
            download_path: row.get("download_path")?,
            downloaded_at: row
                .get::<_, Option<String>>("downloaded_at")?
                .as_deref()
                .and_then(parse_timestamp),
            uploaded: row.get::<_, i64>("uploaded")? != 0,
            upload_message_id: row.get("upload_message_id")?,
            last_upload_attempt_at: row
                .get::<_, Option<String>>("last_upload_attempt_at")?
                .as_deref()
                .and_then(parse_timestamp),
            // discovered_at is NOT NULL; an unreadable value falls back to
            // the read time so ordering queries keep working.
            discovered_at: parse_timestamp(&row.get::<_, String>("discovered_at")?)
                .unwrap_or_else(Utc::now),
        })
    }

    /// Insert or refresh a batch of videos keyed by URL.
    ///
    /// Conflicts refresh `title`, `media_source_url`, and `discovered_at`;
    /// download and upload state is preserved.
    pub fn upsert(&self, videos: &[Video]) -> Result<()> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO videos (url, title, post_id, media_source_url, discovered_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                media_source_url = COALESCE(excluded.media_source_url, media_source_url),
                discovered_at = excluded.discovered_at
            "#,
        )?;
        for video in videos {
            stmt.execute(params![
                video.url,
                video.title,
                video.post_id,
                video.media_source_url,
                video.discovered_at.to_rfc3339(),
            ])?;
        }
        Ok(())
    }

    /// All videos, most recently discovered first.
    pub fn get_all(&self) -> Result<Vec<Video>> {
        self.query("SELECT * FROM videos ORDER BY discovered_at DESC")
    }

    /// Videos with a media URL that have not been downloaded yet.
    pub fn get_undownloaded(&self) -> Result<Vec<Video>> {
        self.query(
            "SELECT * FROM videos
             WHERE downloaded = 0 AND media_source_url IS NOT NULL
             ORDER BY discovered_at DESC",
        )
    }

    /// Downloaded videos awaiting delivery, oldest download first.
    pub fn get_downloaded_not_uploaded(&self) -> Result<Vec<Video>> {
        self.query(
            "SELECT * FROM videos
             WHERE downloaded = 1 AND uploaded = 0 AND download_path IS NOT NULL
             ORDER BY downloaded_at ASC",
        )
    }

    /// Videos discovered without a media URL (resolution pending or failed).
    pub fn get_missing_media_url(&self, limit: usize) -> Result<Vec<Video>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM videos
             WHERE media_source_url IS NULL AND downloaded = 0
             ORDER BY discovered_at DESC LIMIT ?1",
        )?;
        let videos = stmt
            .query_map(params![limit as i64], Self::row_to_video)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(videos)
    }

    fn query(&self, sql: &str) -> Result<Vec<Video>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let videos = stmt
            .query_map([], Self::row_to_video)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(videos)
    }

    /// Get a single video by post URL.
    pub fn get(&self, url: &str) -> Result<Option<Video>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM videos WHERE url = ?1")?;
        let mut rows = stmt.query_map(params![url], Self::row_to_video)?;
        rows.next().transpose()
    }

    /// Whether a post URL is already known.
    pub fn exists(&self, url: &str) -> Result<bool> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM videos WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Overwrite the media source URL (the previous value has expired).
    pub fn update_media_url(&self, url: &str, media_url: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE videos SET media_source_url = ?1 WHERE url = ?2",
            params![media_url, url],
        )?;
        Ok(())
    }

    /// Mark a video downloaded with its final on-disk path.
    pub fn mark_downloaded(&self, url: &str, path: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE videos SET downloaded = 1, download_path = ?1, downloaded_at = ?2
             WHERE url = ?3",
            params![path, Utc::now().to_rfc3339(), url],
        )?;
        Ok(())
    }

    /// Mark a video uploaded with the delivery message id, if any.
    pub fn mark_uploaded(&self, url: &str, message_id: Option<&str>) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE videos SET uploaded = 1, upload_message_id = ?1,
                 last_upload_attempt_at = ?2
             WHERE url = ?3",
            params![message_id, Utc::now().to_rfc3339(), url],
        )?;
        Ok(())
    }

    /// Record a failed upload attempt without changing state.
    pub fn touch_upload_attempt(&self, url: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE videos SET last_upload_attempt_at = ?1 WHERE url = ?2",
            params![Utc::now().to_rfc3339(), url],
        )?;
        Ok(())
    }

    /// Count of videos with a media URL still awaiting download.
    pub fn count_undownloaded(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM videos WHERE downloaded = 0 AND media_source_url IS NOT NULL")
    }

    /// Count of downloaded videos awaiting delivery.
    pub fn count_pending_uploads(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM videos WHERE downloaded = 1 AND uploaded = 0")
    }

    /// Count of completed downloads.
    pub fn count_downloads(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM videos WHERE downloaded = 1")
    }

    /// Count of completed uploads.
    pub fn count_uploads(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM videos WHERE uploaded = 1")
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, VideoRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = VideoRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    fn video(url: &str, post_id: &str) -> Video {
        Video::discovered(url.to_string(), format!("Title {}", post_id), post_id.to_string())
    }

    #[test]
    fn test_upsert_preserves_download_state() {
        let (_dir, repo) = repo();
        let v = video("https://example/post/X1", "X1");
        repo.upsert(std::slice::from_ref(&v)).unwrap();
        repo.mark_downloaded(&v.url, "/data/A_X1.mp4").unwrap();

        // Re-discovery refreshes the title but must not reset state.
        let mut again = video("https://example/post/X1", "X1");
        again.title = "New Title".to_string();
        repo.upsert(&[again]).unwrap();

        let stored = repo.get("https://example/post/X1").unwrap().unwrap();
        assert!(stored.downloaded);
        assert_eq!(stored.title, "New Title");
        assert_eq!(stored.download_path.as_deref(), Some("/data/A_X1.mp4"));
    }

    #[test]
    fn test_upsert_keeps_media_url_when_refreshed_without_one() {
        let (_dir, repo) = repo();
        let v = video("https://example/post/X1", "X1");
        repo.upsert(std::slice::from_ref(&v)).unwrap();
        repo.update_media_url(&v.url, "https://cdn/X1.vid").unwrap();

        repo.upsert(&[video("https://example/post/X1", "X1")]).unwrap();
        let stored = repo.get(&v.url).unwrap().unwrap();
        assert_eq!(stored.media_source_url.as_deref(), Some("https://cdn/X1.vid"));
    }

    #[test]
    fn test_undownloaded_requires_media_url() {
        let (_dir, repo) = repo();
        repo.upsert(&[video("https://example/post/X1", "X1")]).unwrap();
        assert!(repo.get_undownloaded().unwrap().is_empty());

        repo.update_media_url("https://example/post/X1", "https://cdn/X1.vid")
            .unwrap();
        assert_eq!(repo.get_undownloaded().unwrap().len(), 1);
    }

    #[test]
    fn test_state_invariants_hold() {
        // uploaded implies downloaded implies a download path.
        let (_dir, repo) = repo();
        let v = video("https://example/post/X1", "X1");
        repo.upsert(std::slice::from_ref(&v)).unwrap();
        repo.mark_downloaded(&v.url, "/data/A_X1.mp4").unwrap();
        repo.mark_uploaded(&v.url, Some("42")).unwrap();

        for stored in repo.get_all().unwrap() {
            if stored.uploaded {
                assert!(stored.downloaded);
            }
            if stored.downloaded {
                assert!(stored.download_path.is_some());
            }
        }
    }

    #[test]
    fn test_pending_uploads_ordered_by_download_time() {
        let (_dir, repo) = repo();
        for id in ["X1", "X2"] {
            let v = video(&format!("https://example/post/{}", id), id);
            repo.upsert(std::slice::from_ref(&v)).unwrap();
        }
        repo.mark_downloaded("https://example/post/X2", "/data/X2.mp4").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        repo.mark_downloaded("https://example/post/X1", "/data/X1.mp4").unwrap();

        let pending = repo.get_downloaded_not_uploaded().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].post_id, "X2");
    }

    #[test]
    fn test_counts() {
        let (_dir, repo) = repo();
        for id in ["X1", "X2", "X3"] {
            let mut v = video(&format!("https://example/post/{}", id), id);
            v.media_source_url = Some(format!("https://cdn/{}.vid", id));
            repo.upsert(std::slice::from_ref(&v)).unwrap();
        }
        repo.mark_downloaded("https://example/post/X1", "/data/X1.mp4").unwrap();
        repo.mark_uploaded("https://example/post/X1", None).unwrap();
        repo.mark_downloaded("https://example/post/X2", "/data/X2.mp4").unwrap();

        assert_eq!(repo.count_undownloaded().unwrap(), 1);
        assert_eq!(repo.count_pending_uploads().unwrap(), 1);
        assert_eq!(repo.count_downloads().unwrap(), 2);
        assert_eq!(repo.count_uploads().unwrap(), 1);
    }

    #[test]
    fn test_touch_upload_attempt_does_not_mark_uploaded() {
        let (_dir, repo) = repo();
        let v = video("https://example/post/X1", "X1");
        repo.upsert(std::slice::from_ref(&v)).unwrap();
        repo.touch_upload_attempt(&v.url).unwrap();

        let stored = repo.get(&v.url).unwrap().unwrap();
        assert!(!stored.uploaded);
        assert!(stored.last_upload_attempt_at.is_some());
    }
}
