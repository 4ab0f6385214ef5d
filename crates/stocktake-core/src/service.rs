//! Shared queue service used by the sync engine and supervisor tooling.
//!
//! Serializes access to the queue database behind an async mutex so the
//! drain task and supervisor reads never interleave mid-transition.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    ConflictRepository, Database, QueueRepository, SqliteConflictRepository,
    SqliteQueueRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    ClientId, ConflictRecord, ConflictType, LastError, NewSubmission, PendingSubmission,
    QueueCounts, Resolution,
};

/// Thread-safe facade over the durable queue and the conflict registry
#[derive(Clone)]
pub struct QueueService {
    db: Arc<Mutex<Database>>,
}

impl QueueService {
    /// Open the queue database at the given filesystem path
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = tokio::task::spawn_blocking(move || Database::open(&db_path))
            .await
            .map_err(|error| Error::Database(error.to_string()))??;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory queue (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Durably capture a submission; the record is committed in state
    /// PENDING before this returns
    pub async fn enqueue(&self, payload: &NewSubmission) -> Result<PendingSubmission> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.enqueue(payload)
    }

    /// Fetch a submission by client ID
    pub async fn get(&self, id: &ClientId) -> Result<Option<PendingSubmission>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.get(id)
    }

    /// List drain-eligible records, oldest first
    pub async fn list_pending(
        &self,
        limit: usize,
        now_ms: i64,
        max_attempts: u32,
    ) -> Result<Vec<PendingSubmission>> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.list_pending(limit, now_ms, max_attempts)
    }

    /// Take the sync lease on a record
    pub async fn mark_syncing(&self, id: &ClientId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.mark_syncing(id)
    }

    /// Complete a leased record
    pub async fn mark_synced(&self, id: &ClientId) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.mark_synced(id)
    }

    /// Fail a leased record, recording the error and backoff eligibility
    pub async fn mark_failed(
        &self,
        id: &ClientId,
        error: &LastError,
        next_attempt_at: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.mark_failed(id, error, next_attempt_at)
    }

    /// Move a leased record to CONFLICT and register the conflict, in one
    /// transaction
    pub async fn record_conflict(
        &self,
        record: &PendingSubmission,
        conflict_type: ConflictType,
        remote_snapshot: serde_json::Value,
    ) -> Result<ConflictRecord> {
        let db = self.db.lock().await;
        let tx = db.connection().unchecked_transaction()?;

        let local_snapshot = serde_json::to_value(&record.payload)?;
        let conflict = {
            let queue = SqliteQueueRepository::new(&tx);
            let conflicts = SqliteConflictRepository::new(&tx);

            queue.mark_conflict(&record.client_id)?;
            conflicts.insert(
                &record.client_id,
                &record.payload.session_id,
                conflict_type,
                &local_snapshot,
                &remote_snapshot,
            )?
        };

        tx.commit()?;
        Ok(conflict)
    }

    /// List conflicts, optionally scoped to one session
    pub async fn list_conflicts(
        &self,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConflictRecord>> {
        let db = self.db.lock().await;
        let repo = SqliteConflictRepository::new(db.connection());
        repo.list(session_id, limit)
    }

    /// Apply a supervisor decision to an open conflict.
    ///
    /// KEEP_LOCAL re-enqueues the local snapshot as a fresh PENDING
    /// submission with a new `client_id` (returned); KEEP_REMOTE discards
    /// the local queue record; MERGED only records the decision (the merged
    /// payload arrives separately as a new submission).
    pub async fn resolve_conflict(
        &self,
        client_id: &ClientId,
        resolution: Resolution,
    ) -> Result<Option<PendingSubmission>> {
        if resolution == Resolution::Open {
            return Err(Error::Validation(
                "cannot resolve a conflict back to OPEN".to_string(),
            ));
        }

        let db = self.db.lock().await;
        let tx = db.connection().unchecked_transaction()?;

        let requeued = {
            let queue = SqliteQueueRepository::new(&tx);
            let conflicts = SqliteConflictRepository::new(&tx);

            let conflict = conflicts
                .get_open_by_client_id(client_id)?
                .ok_or_else(|| Error::NotFound(format!("open conflict for {client_id}")))?;
            conflicts.resolve(client_id, resolution)?;

            match resolution {
                Resolution::ResolvedKeepLocal => {
                    let payload: NewSubmission =
                        serde_json::from_value(conflict.local_snapshot)?;
                    Some(queue.enqueue(&payload)?)
                }
                Resolution::ResolvedKeepRemote => {
                    // The record may already have been purged; the conflict
                    // row keeps both snapshots for audit either way.
                    match queue.delete(client_id) {
                        Ok(()) | Err(Error::NotFound(_)) => {}
                        Err(error) => return Err(error),
                    }
                    None
                }
                Resolution::ResolvedMerged | Resolution::Open => None,
            }
        };

        tx.commit()?;
        Ok(requeued)
    }

    /// Aggregate counts for the supervisor status read
    pub async fn counts(&self, max_attempts: u32) -> Result<QueueCounts> {
        let db = self.db.lock().await;
        let queue = SqliteQueueRepository::new(db.connection());
        let conflicts = SqliteConflictRepository::new(db.connection());

        let (pending, failed) = queue.counts(max_attempts)?;
        Ok(QueueCounts {
            pending,
            failed,
            conflicts: conflicts.count_open()?,
        })
    }

    /// Garbage-collect SYNCED records older than the retention window;
    /// CONFLICT records are never purged
    pub async fn purge_synced(&self, older_than_ms: i64) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = SqliteQueueRepository::new(db.connection());
        repo.purge_synced(older_than_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncState;
    use serde_json::json;

    fn sample(item_code: &str) -> NewSubmission {
        NewSubmission::new("S-1", item_code, 5)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_and_counts() {
        let service = QueueService::open_in_memory().unwrap();

        service.enqueue(&sample("A1")).await.unwrap();
        service.enqueue(&sample("B2")).await.unwrap();

        let counts = service.counts(3).await.unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.failed, 0);
        assert_eq!(counts.conflicts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_record_conflict_registers_and_transitions() {
        let service = QueueService::open_in_memory().unwrap();

        let record = service.enqueue(&sample("A1")).await.unwrap();
        service.mark_syncing(&record.client_id).await.unwrap();
        let conflict = service
            .record_conflict(
                &record,
                ConflictType::SessionClosed,
                json!({"counted_qty": 8}),
            )
            .await
            .unwrap();

        assert_eq!(conflict.client_id, record.client_id);
        assert_eq!(conflict.resolution_state, Resolution::Open);

        let stored = service.get(&record.client_id).await.unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::Conflict);
        assert_eq!(service.counts(3).await.unwrap().conflicts, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_keep_local_reenqueues_with_fresh_client_id() {
        let service = QueueService::open_in_memory().unwrap();

        let mut payload = sample("A1");
        payload.remark = Some("shelf damaged".to_string());
        let record = service.enqueue(&payload).await.unwrap();
        service.mark_syncing(&record.client_id).await.unwrap();
        service
            .record_conflict(&record, ConflictType::StaleBase, json!({"counted_qty": 8}))
            .await
            .unwrap();

        let requeued = service
            .resolve_conflict(&record.client_id, Resolution::ResolvedKeepLocal)
            .await
            .unwrap()
            .expect("keep-local should re-enqueue");

        assert_ne!(requeued.client_id, record.client_id);
        assert_eq!(requeued.payload, payload);
        assert_eq!(requeued.sync_state, SyncState::Pending);

        let conflicts = service.list_conflicts(None, 10).await.unwrap();
        assert_eq!(conflicts[0].resolution_state, Resolution::ResolvedKeepLocal);
        assert_eq!(service.counts(3).await.unwrap().conflicts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_keep_remote_discards_local_record() {
        let service = QueueService::open_in_memory().unwrap();

        let record = service.enqueue(&sample("A1")).await.unwrap();
        service.mark_syncing(&record.client_id).await.unwrap();
        service
            .record_conflict(
                &record,
                ConflictType::DuplicateSerial,
                json!({"serial": "SN-1"}),
            )
            .await
            .unwrap();

        let requeued = service
            .resolve_conflict(&record.client_id, Resolution::ResolvedKeepRemote)
            .await
            .unwrap();
        assert!(requeued.is_none());

        assert!(service.get(&record.client_id).await.unwrap().is_none());
        let conflicts = service.list_conflicts(Some("S-1"), 10).await.unwrap();
        assert_eq!(
            conflicts[0].resolution_state,
            Resolution::ResolvedKeepRemote
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_rejects_unknown_and_open() {
        let service = QueueService::open_in_memory().unwrap();

        let error = service
            .resolve_conflict(&ClientId::new(), Resolution::ResolvedKeepLocal)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));

        let error = service
            .resolve_conflict(&ClientId::new(), Resolution::Open)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Validation(_)));
    }
}
