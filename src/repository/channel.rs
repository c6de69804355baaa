//! Channel repository.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;

use super::{connect, parse_timestamp, Result};
use crate::models::Channel;

/// SQLite-backed channel repository.
pub struct ChannelRepository {
    db_path: PathBuf,
}

impl ChannelRepository {
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
            CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                check_interval_minutes INTEGER NOT NULL DEFAULT 60,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_checked TEXT
            );
        "#,
        )?;
        Ok(())
    }

    fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
        Ok(Channel {
            id: row.get("id")?,
            name: row.get("name")?,
            url: row.get("url")?,
            check_interval_minutes: row.get("check_interval_minutes")?,
            is_active: row.get::<_, i64>("is_active")? != 0,
            last_checked: row
                .get::<_, Option<String>>("last_checked")?
                .as_deref()
                .and_then(parse_timestamp),
        })
    }

    /// Save a channel, updating name/interval on URL conflict.
    pub fn save(&self, name: &str, url: &str, check_interval_minutes: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO channels (name, url, check_interval_minutes)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                check_interval_minutes = excluded.check_interval_minutes,
                is_active = 1
            "#,
            params![name, url, check_interval_minutes],
        )?;
        Ok(())
    }

    /// All active channels, in insertion order.
    pub fn get_active(&self) -> Result<Vec<Channel>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM channels WHERE is_active = 1 ORDER BY id ASC")?;
        let channels = stmt
            .query_map([], Self::row_to_channel)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    /// All channels, active or not.
    pub fn get_all(&self) -> Result<Vec<Channel>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM channels ORDER BY id ASC")?;
        let channels = stmt
            .query_map([], Self::row_to_channel)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(channels)
    }

    /// Record that a channel was scanned now.
    pub fn touch_last_checked(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE channels SET last_checked = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, ChannelRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = ChannelRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_save_and_get_active() {
        let (_dir, repo) = repo();
        repo.save("alpha", "https://example/ch/alpha.html", 60).unwrap();
        repo.save("beta", "https://example/ch/beta.html", 30).unwrap();

        let channels = repo.get_active().unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].name, "alpha");
        assert_eq!(channels[1].check_interval_minutes, 30);
        assert!(channels[0].last_checked.is_none());
    }

    #[test]
    fn test_save_upserts_on_url() {
        let (_dir, repo) = repo();
        repo.save("alpha", "https://example/ch/alpha.html", 60).unwrap();
        repo.save("alpha renamed", "https://example/ch/alpha.html", 15).unwrap();

        let channels = repo.get_active().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "alpha renamed");
        assert_eq!(channels[0].check_interval_minutes, 15);
    }

    #[test]
    fn test_touch_last_checked() {
        let (_dir, repo) = repo();
        repo.save("alpha", "https://example/ch/alpha.html", 60).unwrap();
        let id = repo.get_active().unwrap()[0].id;

        repo.touch_last_checked(id).unwrap();
        let checked = repo.get_active().unwrap()[0].last_checked;
        assert!(checked.is_some());
        assert!(!repo.get_active().unwrap()[0].is_due(checked.unwrap()));
    }
}
