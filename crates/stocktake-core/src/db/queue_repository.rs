//! Durable local queue for count submissions

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT and counters

use crate::error::{Error, Result};
use crate::models::{
    ClientId, ErrorKind, LastError, NewSubmission, PendingSubmission, SyncState,
};
use rusqlite::{params, Connection};

const SUBMISSION_COLUMNS: &str = "client_id, session_id, item_code, batch_id, counted_qty, \
     damaged_qty, non_returnable_damaged_qty, item_condition, remark, mrp_counted, \
     category_correction, subcategory_correction, manufacturing_date, expiry_date, \
     floor_no, rack_no, serial_numbers, photo_reference, sync_state, attempt_count, \
     last_error_kind, last_error_message, next_attempt_at, created_at, updated_at";

/// Trait for durable queue storage operations.
///
/// All state transitions are guarded UPDATEs so that readers never observe a
/// half-written record and no two callers can lease the same record.
pub trait QueueRepository {
    /// Validate and persist a new submission in state PENDING.
    ///
    /// The write is committed before this returns, so a crash after a
    /// successful return never loses the submission.
    fn enqueue(&self, payload: &NewSubmission) -> Result<PendingSubmission>;

    /// Get a submission by client ID
    fn get(&self, id: &ClientId) -> Result<Option<PendingSubmission>>;

    /// List records eligible for a drain pass, oldest first (FIFO).
    ///
    /// Eligible means PENDING, or FAILED with a retryable error, attempts
    /// remaining, and an elapsed backoff window.
    fn list_pending(
        &self,
        limit: usize,
        now_ms: i64,
        max_attempts: u32,
    ) -> Result<Vec<PendingSubmission>>;

    /// Take the sync lease: PENDING/FAILED -> SYNCING.
    ///
    /// Fails with `AlreadyLeased` if the record is in any other state.
    fn mark_syncing(&self, id: &ClientId) -> Result<()>;

    /// SYNCING -> SYNCED; clears the last error
    fn mark_synced(&self, id: &ClientId) -> Result<()>;

    /// SYNCING -> FAILED; increments `attempt_count` and records the error
    /// and the earliest time another attempt may run
    fn mark_failed(&self, id: &ClientId, error: &LastError, next_attempt_at: i64) -> Result<()>;

    /// SYNCING -> CONFLICT
    fn mark_conflict(&self, id: &ClientId) -> Result<()>;

    /// Discard a record entirely (KEEP_REMOTE resolution)
    fn delete(&self, id: &ClientId) -> Result<()>;

    /// Garbage-collect SYNCED records older than the given timestamp.
    /// CONFLICT records are never purged. Returns the number removed.
    fn purge_synced(&self, older_than_ms: i64) -> Result<usize>;

    /// Count records still owed to the backend and records needing an
    /// operator (terminal failures)
    fn counts(&self, max_attempts: u32) -> Result<(u64, u64)>;
}

/// `SQLite` implementation of `QueueRepository`
pub struct SqliteQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a submission from a database row
    fn parse_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingSubmission> {
        let client_id: String = row.get(0)?;
        // A client_id that no longer parses is corruption, not a default:
        // minting a fresh id would sever the local/remote correlation key.
        let client_id: ClientId = client_id.parse().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;
        let serial_numbers: String = row.get(16)?;
        let sync_state: String = row.get(18)?;
        let last_error_kind: Option<String> = row.get(20)?;
        let last_error_message: Option<String> = row.get(21)?;

        let last_error = match (last_error_kind, last_error_message) {
            (Some(kind), Some(message)) => kind.parse::<ErrorKind>().ok().map(|kind| LastError {
                kind,
                message,
            }),
            _ => None,
        };

        Ok(PendingSubmission {
            client_id,
            payload: NewSubmission {
                session_id: row.get(1)?,
                item_code: row.get(2)?,
                batch_id: row.get(3)?,
                counted_qty: row.get(4)?,
                damaged_qty: row.get(5)?,
                non_returnable_damaged_qty: row.get(6)?,
                item_condition: row.get(7)?,
                remark: row.get(8)?,
                mrp_counted: row.get(9)?,
                category_correction: row.get(10)?,
                subcategory_correction: row.get(11)?,
                manufacturing_date: row.get(12)?,
                expiry_date: row.get(13)?,
                floor_no: row.get(14)?,
                rack_no: row.get(15)?,
                serial_numbers: serde_json::from_str(&serial_numbers).unwrap_or_default(),
                photo_reference: row.get(17)?,
            },
            sync_state: sync_state.parse().unwrap_or(SyncState::Pending),
            attempt_count: row.get(19)?,
            last_error,
            next_attempt_at: row.get(22)?,
            created_at: row.get(23)?,
            updated_at: row.get(24)?,
        })
    }
}

impl QueueRepository for SqliteQueueRepository<'_> {
    fn enqueue(&self, payload: &NewSubmission) -> Result<PendingSubmission> {
        payload.validate().map_err(Error::Validation)?;

        let record = PendingSubmission::new(payload.clone());
        let serial_numbers = serde_json::to_string(&record.payload.serial_numbers)?;

        self.conn.execute(
            "INSERT INTO pending_submissions (
                client_id, session_id, item_code, batch_id, counted_qty,
                damaged_qty, non_returnable_damaged_qty, item_condition, remark, mrp_counted,
                category_correction, subcategory_correction, manufacturing_date, expiry_date,
                floor_no, rack_no, serial_numbers, photo_reference, sync_state, attempt_count,
                next_attempt_at, created_at, updated_at
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
             )",
            params![
                record.client_id.as_str(),
                record.payload.session_id,
                record.payload.item_code,
                record.payload.batch_id,
                record.payload.counted_qty,
                record.payload.damaged_qty,
                record.payload.non_returnable_damaged_qty,
                record.payload.item_condition,
                record.payload.remark,
                record.payload.mrp_counted,
                record.payload.category_correction,
                record.payload.subcategory_correction,
                record.payload.manufacturing_date,
                record.payload.expiry_date,
                record.payload.floor_no,
                record.payload.rack_no,
                serial_numbers,
                record.payload.photo_reference,
                record.sync_state.as_str(),
                record.attempt_count,
                record.next_attempt_at,
                record.created_at,
                record.updated_at,
            ],
        )?;

        Ok(record)
    }

    fn get(&self, id: &ClientId) -> Result<Option<PendingSubmission>> {
        let result = self.conn.query_row(
            &format!("SELECT {SUBMISSION_COLUMNS} FROM pending_submissions WHERE client_id = ?"),
            params![id.as_str()],
            Self::parse_submission,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_pending(
        &self,
        limit: usize,
        now_ms: i64,
        max_attempts: u32,
    ) -> Result<Vec<PendingSubmission>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUBMISSION_COLUMNS}
             FROM pending_submissions
             WHERE sync_state = 'PENDING'
                OR (sync_state = 'FAILED'
                    AND last_error_kind = 'retryable'
                    AND attempt_count < ?1
                    AND next_attempt_at <= ?2)
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?3"
        ))?;

        let records = stmt
            .query_map(
                params![max_attempts, now_ms, limit as i64],
                Self::parse_submission,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn mark_syncing(&self, id: &ClientId) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE pending_submissions
             SET sync_state = 'SYNCING', updated_at = ?1
             WHERE client_id = ?2 AND sync_state IN ('PENDING', 'FAILED')",
            params![now, id.as_str()],
        )?;

        if rows == 0 {
            return match self.get(id)? {
                Some(record) => Err(Error::AlreadyLeased(format!(
                    "{id} is {}",
                    record.sync_state
                ))),
                None => Err(Error::NotFound(id.to_string())),
            };
        }

        Ok(())
    }

    fn mark_synced(&self, id: &ClientId) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE pending_submissions
             SET sync_state = 'SYNCED',
                 last_error_kind = NULL,
                 last_error_message = NULL,
                 updated_at = ?1
             WHERE client_id = ?2 AND sync_state = 'SYNCING'",
            params![now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{id} (not SYNCING)")));
        }

        Ok(())
    }

    fn mark_failed(&self, id: &ClientId, error: &LastError, next_attempt_at: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE pending_submissions
             SET sync_state = 'FAILED',
                 attempt_count = attempt_count + 1,
                 last_error_kind = ?1,
                 last_error_message = ?2,
                 next_attempt_at = ?3,
                 updated_at = ?4
             WHERE client_id = ?5 AND sync_state = 'SYNCING'",
            params![
                error.kind.as_str(),
                error.message,
                next_attempt_at,
                now,
                id.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{id} (not SYNCING)")));
        }

        Ok(())
    }

    fn mark_conflict(&self, id: &ClientId) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        let rows = self.conn.execute(
            "UPDATE pending_submissions
             SET sync_state = 'CONFLICT', updated_at = ?1
             WHERE client_id = ?2 AND sync_state = 'SYNCING'",
            params![now, id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{id} (not SYNCING)")));
        }

        Ok(())
    }

    fn delete(&self, id: &ClientId) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM pending_submissions WHERE client_id = ?",
            params![id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn purge_synced(&self, older_than_ms: i64) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM pending_submissions
             WHERE sync_state = 'SYNCED' AND updated_at < ?",
            params![older_than_ms],
        )?;

        Ok(rows)
    }

    fn counts(&self, max_attempts: u32) -> Result<(u64, u64)> {
        let pending: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_submissions
             WHERE sync_state = 'PENDING'
                OR (sync_state = 'FAILED'
                    AND last_error_kind = 'retryable'
                    AND attempt_count < ?1)",
            params![max_attempts],
            |row| row.get(0),
        )?;

        let failed: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pending_submissions
             WHERE sync_state = 'FAILED'
               AND (last_error_kind = 'non_retryable' OR attempt_count >= ?1)",
            params![max_attempts],
            |row| row.get(0),
        )?;

        Ok((pending as u64, failed as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ErrorKind;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn retryable(message: &str) -> LastError {
        LastError {
            kind: ErrorKind::Retryable,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_enqueue_and_get() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let mut payload = NewSubmission::new("S-1", "A1", 5);
        payload.serial_numbers = vec!["SN-1".to_string(), "SN-2".to_string()];
        payload.rack_no = Some("R-12".to_string());

        let record = repo.enqueue(&payload).unwrap();
        assert_eq!(record.sync_state, SyncState::Pending);

        let fetched = repo.get(&record.client_id).unwrap().unwrap();
        assert_eq!(fetched, record);
        assert_eq!(fetched.payload.serial_numbers, vec!["SN-1", "SN-2"]);
    }

    #[test]
    fn test_enqueue_rejects_invalid_payload() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let error = repo.enqueue(&NewSubmission::new("", "A1", 5)).unwrap_err();
        assert!(matches!(error, Error::Validation(_)));

        // Nothing entered the queue
        assert_eq!(repo.counts(3).unwrap(), (0, 0));
    }

    #[test]
    fn test_list_pending_is_fifo() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let first = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        let second = repo.enqueue(&NewSubmission::new("S-1", "B2", 5)).unwrap();
        let third = repo.enqueue(&NewSubmission::new("S-1", "C3", 5)).unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        let listed = repo.list_pending(20, now, 3).unwrap();
        let ids: Vec<_> = listed.iter().map(|record| record.client_id).collect();
        assert_eq!(ids, vec![first.client_id, second.client_id, third.client_id]);
    }

    #[test]
    fn test_mark_syncing_rejects_double_lease() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        repo.mark_syncing(&record.client_id).unwrap();

        let error = repo.mark_syncing(&record.client_id).unwrap_err();
        assert!(matches!(error, Error::AlreadyLeased(_)));
    }

    #[test]
    fn test_mark_syncing_unknown_record() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let error = repo.mark_syncing(&ClientId::new()).unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[test]
    fn test_synced_records_leave_the_active_queue() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        repo.mark_syncing(&record.client_id).unwrap();
        repo.mark_synced(&record.client_id).unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        assert!(repo.list_pending(20, now, 3).unwrap().is_empty());

        let stored = repo.get(&record.client_id).unwrap().unwrap();
        assert_eq!(stored.sync_state, SyncState::Synced);
        assert!(stored.last_error.is_none());
    }

    #[test]
    fn test_mark_failed_respects_backoff_window() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        repo.mark_syncing(&record.client_id).unwrap();
        repo.mark_failed(&record.client_id, &retryable("timeout"), now + 60_000)
            .unwrap();

        // Not eligible until the backoff window elapses
        assert!(repo.list_pending(20, now, 3).unwrap().is_empty());
        assert_eq!(repo.list_pending(20, now + 60_000, 3).unwrap().len(), 1);

        let stored = repo.get(&record.client_id).unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.unwrap().message, "timeout");
    }

    #[test]
    fn test_failed_records_exhaust_attempts() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        for _ in 0..3 {
            repo.mark_syncing(&record.client_id).unwrap();
            repo.mark_failed(&record.client_id, &retryable("503"), now).unwrap();
        }

        // Attempts exhausted: terminal, surfaced via failed count
        assert!(repo.list_pending(20, now + 1, 3).unwrap().is_empty());
        assert_eq!(repo.counts(3).unwrap(), (0, 1));
    }

    #[test]
    fn test_non_retryable_failure_is_never_relisted() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        let now = chrono::Utc::now().timestamp_millis();

        repo.mark_syncing(&record.client_id).unwrap();
        repo.mark_failed(
            &record.client_id,
            &LastError {
                kind: ErrorKind::NonRetryable,
                message: "422 unknown item".to_string(),
            },
            now,
        )
        .unwrap();

        assert!(repo.list_pending(20, now + 1, 3).unwrap().is_empty());
        assert_eq!(repo.counts(3).unwrap(), (0, 1));
    }

    #[test]
    fn test_purge_synced_keeps_conflicts() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let synced = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        repo.mark_syncing(&synced.client_id).unwrap();
        repo.mark_synced(&synced.client_id).unwrap();

        let conflicted = repo.enqueue(&NewSubmission::new("S-1", "B2", 5)).unwrap();
        repo.mark_syncing(&conflicted.client_id).unwrap();
        repo.mark_conflict(&conflicted.client_id).unwrap();

        let far_future = chrono::Utc::now().timestamp_millis() + 1;
        let purged = repo.purge_synced(far_future).unwrap();
        assert_eq!(purged, 1);

        assert!(repo.get(&synced.client_id).unwrap().is_none());
        assert!(repo.get(&conflicted.client_id).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_client_id_surfaces_as_error() {
        let db = setup();
        db.connection()
            .execute(
                "INSERT INTO pending_submissions (
                    client_id, session_id, item_code, counted_qty,
                    next_attempt_at, created_at, updated_at
                 ) VALUES ('not-a-uuid', 'S-1', 'A1', 5, 0, 0, 0)",
                [],
            )
            .unwrap();

        let repo = SqliteQueueRepository::new(db.connection());
        let now = chrono::Utc::now().timestamp_millis();
        let error = repo.list_pending(20, now, 3).unwrap_err();
        assert!(matches!(error, Error::Sqlite(_)));
    }

    #[test]
    fn test_delete_discards_record() {
        let db = setup();
        let repo = SqliteQueueRepository::new(db.connection());

        let record = repo.enqueue(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        repo.delete(&record.client_id).unwrap();
        assert!(repo.get(&record.client_id).unwrap().is_none());

        assert!(matches!(
            repo.delete(&record.client_id).unwrap_err(),
            Error::NotFound(_)
        ));
    }
}
