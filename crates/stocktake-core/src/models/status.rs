//! Aggregate queue status for supervisor tooling

use serde::{Deserialize, Serialize};

/// Row counts derived from the queue in a single read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// PENDING plus retry-eligible FAILED records
    pub pending: u64,
    /// FAILED records with no attempts left or a non-retryable rejection
    pub failed: u64,
    /// Open conflicts
    pub conflicts: u64,
}

/// Snapshot backing the "offline queue" and "sync conflicts" screens
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub pending_count: u64,
    pub failed_count: u64,
    pub conflict_count: u64,
    /// Completion time of the last drain pass (unix ms), if any ran
    pub last_sync_at: Option<i64>,
    pub is_online: bool,
}
