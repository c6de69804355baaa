//! User agent rotation for solver sessions.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// Real browser user agents used for solver sessions and downloads.
pub const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Round-robin user agent pool with a small random jump on each rotation,
/// so consecutive sessions do not walk the list in a fixed order.
pub struct UserAgentPool {
    index: AtomicUsize,
}

impl UserAgentPool {
    pub fn new() -> Self {
        Self {
            index: AtomicUsize::new(rand::rng().random_range(0..USER_AGENTS.len())),
        }
    }

    /// The user agent at the current position.
    pub fn current(&self) -> &'static str {
        USER_AGENTS[self.index.load(Ordering::Relaxed) % USER_AGENTS.len()]
    }

    /// Advance to a new user agent and return it.
    pub fn rotate(&self) -> &'static str {
        let jump = 1 + rand::rng().random_range(0..3usize);
        let next = self.index.fetch_add(jump, Ordering::Relaxed) + jump;
        USER_AGENTS[next % USER_AGENTS.len()]
    }
}

impl Default for UserAgentPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable() {
        let pool = UserAgentPool::new();
        assert_eq!(pool.current(), pool.current());
    }

    #[test]
    fn test_rotate_changes_agent() {
        let pool = UserAgentPool::new();
        let before = pool.current();
        let after = pool.rotate();
        assert_ne!(before, after);
        assert_eq!(pool.current(), after);
    }

    #[test]
    fn test_all_agents_look_like_browsers() {
        for ua in USER_AGENTS {
            assert!(ua.starts_with("Mozilla/5.0"));
        }
    }
}
