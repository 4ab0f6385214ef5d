//! Sync conflict commands: list and resolve

use std::path::Path;

use serde::Serialize;
use stocktake_core::models::{ConflictRecord, Resolution};
use stocktake_core::{ClientId, QueueService};

use super::{format_relative_time, now_ms, short_id};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConflictItem {
    client_id: String,
    session_id: String,
    conflict_type: String,
    resolution_state: String,
    detected_at: i64,
    relative_time: String,
    local_snapshot: serde_json::Value,
    remote_snapshot: serde_json::Value,
}

fn conflict_to_item(conflict: &ConflictRecord) -> ConflictItem {
    ConflictItem {
        client_id: conflict.client_id.to_string(),
        session_id: conflict.session_id.clone(),
        conflict_type: conflict.conflict_type.to_string(),
        resolution_state: conflict.resolution_state.as_str().to_string(),
        detected_at: conflict.detected_at,
        relative_time: format_relative_time(conflict.detected_at, now_ms()),
        local_snapshot: conflict.local_snapshot.clone(),
        remote_snapshot: conflict.remote_snapshot.clone(),
    }
}

pub async fn run_conflicts(
    session_id: Option<&str>,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = QueueService::open_path(db_path).await?;
    let conflicts = service.list_conflicts(session_id, limit).await?;

    if as_json {
        let items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    let now = now_ms();
    for conflict in &conflicts {
        println!(
            "{:<13}  {:<12}  {:<16}  {:<20}  {}",
            short_id(&conflict.client_id.to_string()),
            conflict.session_id,
            conflict.conflict_type,
            conflict.resolution_state.as_str(),
            format_relative_time(conflict.detected_at, now),
        );
    }
    Ok(())
}

pub async fn run_resolve(
    client_id: &str,
    resolution: Resolution,
    db_path: &Path,
) -> Result<(), CliError> {
    let client_id: ClientId = client_id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidClientId(client_id.to_string()))?;

    let service = QueueService::open_path(db_path).await?;
    let requeued = service.resolve_conflict(&client_id, resolution).await?;

    tracing::info!(%client_id, resolution = resolution.as_str(), "conflict resolved");
    match requeued {
        Some(record) => println!("Re-enqueued as {}", record.client_id),
        None => println!("Resolved"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stocktake_core::models::{ConflictType, NewSubmission};
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_keep_local_prints_new_id() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("queue.db");

        let service = QueueService::open_path(&db_path).await.unwrap();
        let record = service
            .enqueue(&NewSubmission::new("S-1", "A1", 5))
            .await
            .unwrap();
        service.mark_syncing(&record.client_id).await.unwrap();
        service
            .record_conflict(&record, ConflictType::StaleBase, json!({"counted_qty": 9}))
            .await
            .unwrap();
        drop(service);

        run_conflicts(Some("S-1"), 10, true, &db_path).await.unwrap();
        run_resolve(
            &record.client_id.to_string(),
            Resolution::ResolvedKeepLocal,
            &db_path,
        )
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_rejects_malformed_id() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("queue.db");

        let error = run_resolve("not-a-uuid", Resolution::ResolvedKeepRemote, &db_path)
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::InvalidClientId(_)));
    }
}
