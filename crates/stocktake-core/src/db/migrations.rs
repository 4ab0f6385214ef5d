//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: queue schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS schema_version (
             version INTEGER PRIMARY KEY
         );
         CREATE TABLE IF NOT EXISTS pending_submissions (
             client_id TEXT PRIMARY KEY,
             session_id TEXT NOT NULL,
             item_code TEXT NOT NULL,
             batch_id TEXT,
             counted_qty INTEGER NOT NULL,
             damaged_qty INTEGER NOT NULL DEFAULT 0,
             non_returnable_damaged_qty INTEGER NOT NULL DEFAULT 0,
             item_condition TEXT,
             remark TEXT,
             mrp_counted TEXT,
             category_correction TEXT,
             subcategory_correction TEXT,
             manufacturing_date TEXT,
             expiry_date TEXT,
             floor_no TEXT,
             rack_no TEXT,
             serial_numbers TEXT NOT NULL DEFAULT '[]',
             photo_reference TEXT,
             sync_state TEXT NOT NULL DEFAULT 'PENDING',
             attempt_count INTEGER NOT NULL DEFAULT 0,
             last_error_kind TEXT,
             last_error_message TEXT,
             next_attempt_at INTEGER NOT NULL,
             created_at INTEGER NOT NULL,
             updated_at INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_submissions_state_created
             ON pending_submissions(sync_state, created_at);
         CREATE INDEX IF NOT EXISTS idx_submissions_session
             ON pending_submissions(session_id);
         INSERT INTO schema_version (version) VALUES (1);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: conflict registry
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE IF NOT EXISTS sync_conflicts (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             client_id TEXT NOT NULL,
             session_id TEXT NOT NULL,
             conflict_type TEXT NOT NULL,
             local_snapshot TEXT NOT NULL,
             remote_snapshot TEXT NOT NULL,
             detected_at INTEGER NOT NULL,
             resolution_state TEXT NOT NULL DEFAULT 'OPEN'
         );
         CREATE INDEX IF NOT EXISTS idx_conflicts_client_id ON sync_conflicts(client_id);
         CREATE INDEX IF NOT EXISTS idx_conflicts_resolution ON sync_conflicts(resolution_state);
         CREATE INDEX IF NOT EXISTS idx_conflicts_session ON sync_conflicts(session_id);
         INSERT INTO schema_version (version) VALUES (2);
         COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
