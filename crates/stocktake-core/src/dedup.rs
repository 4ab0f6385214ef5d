//! In-session duplicate scan guard
//!
//! Absorbs double-taps and camera re-triggers by rejecting repeat scans of
//! the same item within a short window. Deliberately not persisted: the
//! guard resets on restart, and cross-session deduplication is the backend's
//! `client_id` idempotency responsibility.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window, matching the scanning workflow's debounce
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(2);

/// Rejects repeat submissions for an item within a configurable window,
/// measured from the last *accepted* scan
#[derive(Debug)]
pub struct DedupGuard {
    window: Duration,
    last_accepted: HashMap<String, Instant>,
}

impl DedupGuard {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Returns true when the scan should be accepted, recording `now` as the
    /// item's last accepted time. A rejected scan does not extend the window.
    pub fn should_accept(&mut self, item_code: &str, now: Instant) -> bool {
        if let Some(last) = self.last_accepted.get(item_code) {
            if now.duration_since(*last) < self.window {
                return false;
            }
        }

        self.last_accepted.insert(item_code.to_string(), now);
        true
    }

    /// Drop entries older than the window so long counting sessions do not
    /// grow the map unboundedly
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.last_accepted
            .retain(|_, last| now.duration_since(*last) < window);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}
