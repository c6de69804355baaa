//! Channel model: a source listing page scanned on a schedule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A monitored channel on the target host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Database row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Absolute listing URL.
    pub url: String,
    /// Minimum time between scans.
    pub check_interval_minutes: i64,
    /// Inactive channels are skipped by the automation loop.
    pub is_active: bool,
    /// When the channel was last scanned, if ever.
    pub last_checked: Option<DateTime<Utc>>,
}

impl Channel {
    /// Whether this channel is due for a scan at `now`.
    ///
    /// A channel that has never been checked is always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            None => true,
            Some(last) => now - last >= Duration::minutes(self.check_interval_minutes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(last_checked: Option<DateTime<Utc>>) -> Channel {
        Channel {
            id: 1,
            name: "alpha".to_string(),
            url: "https://example/ch/alpha.html".to_string(),
            check_interval_minutes: 60,
            is_active: true,
            last_checked,
        }
    }

    #[test]
    fn test_never_checked_is_due() {
        assert!(channel(None).is_due(Utc::now()));
    }

    #[test]
    fn test_recently_checked_is_not_due() {
        let now = Utc::now();
        assert!(!channel(Some(now - Duration::minutes(30))).is_due(now));
    }

    #[test]
    fn test_stale_channel_is_due() {
        let now = Utc::now();
        assert!(channel(Some(now - Duration::minutes(61))).is_due(now));
    }
}
