//! Repository layer for SQLite persistence.
//!
//! Repositories open a fresh connection per call and create their schema on
//! construction. SQLite serializes writes to the same row, which is all the
//! pipeline assumes; there are no cross-row transactions.

mod channel;
mod video;

pub use channel::ChannelRepository;
pub use video::VideoRepository;

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::warn;

pub type Result<T> = std::result::Result<T, rusqlite::Error>;

/// Open a connection with a busy timeout so concurrent workers queue on
/// row locks instead of failing.
fn connect(db_path: &Path) -> Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(10))?;
    Ok(conn)
}

/// Parse a timestamp column written by this process (RFC 3339).
///
/// A value that does not parse came from outside the writer path; it is
/// reported and treated as absent rather than silently mapped to a
/// sentinel instant.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %s, error = %e, "unparseable timestamp in store");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_roundtrip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("not-a-date").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
