//! Conflict registry storage

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT and counters

use crate::error::{Error, Result};
use crate::models::{ClientId, ConflictRecord, ConflictType, Resolution};
use rusqlite::{params, Connection};

/// Trait for conflict registry operations
pub trait ConflictRepository {
    /// Record a newly detected conflict as OPEN
    fn insert(
        &self,
        client_id: &ClientId,
        session_id: &str,
        conflict_type: ConflictType,
        local_snapshot: &serde_json::Value,
        remote_snapshot: &serde_json::Value,
    ) -> Result<ConflictRecord>;

    /// List conflicts, newest first, optionally scoped to one session
    fn list(&self, session_id: Option<&str>, limit: usize) -> Result<Vec<ConflictRecord>>;

    /// Get the most recent conflict for a submission
    fn get_open_by_client_id(&self, client_id: &ClientId) -> Result<Option<ConflictRecord>>;

    /// Mark an OPEN conflict resolved
    fn resolve(&self, client_id: &ClientId, resolution: Resolution) -> Result<()>;

    /// Number of conflicts still awaiting resolution
    fn count_open(&self) -> Result<u64>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a conflict from a database row
    fn parse_conflict(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConflictRecord> {
        let client_id: String = row.get(1)?;
        // Corrupt ids must fail loudly: the conflict row would otherwise
        // point at a submission that never existed.
        let client_id: ClientId = client_id.parse().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })?;
        let conflict_type: String = row.get(3)?;
        let local_snapshot: String = row.get(4)?;
        let remote_snapshot: String = row.get(5)?;
        let resolution_state: String = row.get(7)?;

        Ok(ConflictRecord {
            id: row.get(0)?,
            client_id,
            session_id: row.get(2)?,
            conflict_type: conflict_type.parse().unwrap_or(ConflictType::StaleBase),
            local_snapshot: serde_json::from_str(&local_snapshot)
                .unwrap_or(serde_json::Value::Null),
            remote_snapshot: serde_json::from_str(&remote_snapshot)
                .unwrap_or(serde_json::Value::Null),
            detected_at: row.get(6)?,
            resolution_state: resolution_state.parse().unwrap_or(Resolution::Open),
        })
    }
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn insert(
        &self,
        client_id: &ClientId,
        session_id: &str,
        conflict_type: ConflictType,
        local_snapshot: &serde_json::Value,
        remote_snapshot: &serde_json::Value,
    ) -> Result<ConflictRecord> {
        let detected_at = chrono::Utc::now().timestamp_millis();

        self.conn.execute(
            "INSERT INTO sync_conflicts (
                client_id, session_id, conflict_type,
                local_snapshot, remote_snapshot, detected_at, resolution_state
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'OPEN')",
            params![
                client_id.as_str(),
                session_id,
                conflict_type.as_str(),
                serde_json::to_string(local_snapshot)?,
                serde_json::to_string(remote_snapshot)?,
                detected_at,
            ],
        )?;

        Ok(ConflictRecord {
            id: self.conn.last_insert_rowid(),
            client_id: *client_id,
            session_id: session_id.to_string(),
            conflict_type,
            local_snapshot: local_snapshot.clone(),
            remote_snapshot: remote_snapshot.clone(),
            detected_at,
            resolution_state: Resolution::Open,
        })
    }

    fn list(&self, session_id: Option<&str>, limit: usize) -> Result<Vec<ConflictRecord>> {
        let mut query = String::from(
            "SELECT id, client_id, session_id, conflict_type,
                    local_snapshot, remote_snapshot, detected_at, resolution_state
             FROM sync_conflicts",
        );
        if session_id.is_some() {
            query.push_str(" WHERE session_id = ?1");
        }
        query.push_str(" ORDER BY detected_at DESC LIMIT ");
        query.push_str(if session_id.is_some() { "?2" } else { "?1" });

        let mut stmt = self.conn.prepare(&query)?;
        let conflicts = if let Some(session) = session_id {
            stmt.query_map(params![session, limit as i64], Self::parse_conflict)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(params![limit as i64], Self::parse_conflict)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(conflicts)
    }

    fn get_open_by_client_id(&self, client_id: &ClientId) -> Result<Option<ConflictRecord>> {
        let result = self.conn.query_row(
            "SELECT id, client_id, session_id, conflict_type,
                    local_snapshot, remote_snapshot, detected_at, resolution_state
             FROM sync_conflicts
             WHERE client_id = ?1 AND resolution_state = 'OPEN'
             ORDER BY detected_at DESC
             LIMIT 1",
            params![client_id.as_str()],
            Self::parse_conflict,
        );

        match result {
            Ok(conflict) => Ok(Some(conflict)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, client_id: &ClientId, resolution: Resolution) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE sync_conflicts
             SET resolution_state = ?1
             WHERE client_id = ?2 AND resolution_state = 'OPEN'",
            params![resolution.as_str(), client_id.as_str()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("open conflict for {client_id}")));
        }

        Ok(())
    }

    fn count_open(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE resolution_state = 'OPEN'",
            [],
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }
}
