//! Offline queue commands: status, pending list, enqueue, purge

use std::path::Path;

use serde::Serialize;
use stocktake_core::models::PendingSubmission;
use stocktake_core::{NewSubmission, QueueService};

use super::{format_relative_time, now_ms, short_id};
use crate::error::CliError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = QueueService::open_path(db_path).await?;
    let counts = service.counts(DEFAULT_MAX_ATTEMPTS).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("pending:   {}", counts.pending);
    println!("failed:    {}", counts.failed);
    println!("conflicts: {}", counts.conflicts);
    Ok(())
}

#[derive(Debug, Serialize)]
struct PendingItem {
    client_id: String,
    session_id: String,
    item_code: String,
    counted_qty: u32,
    sync_state: String,
    attempt_count: u32,
    last_error: Option<String>,
    created_at: i64,
    relative_time: String,
}

fn submission_to_item(record: &PendingSubmission) -> PendingItem {
    PendingItem {
        client_id: record.client_id.to_string(),
        session_id: record.payload.session_id.clone(),
        item_code: record.payload.item_code.clone(),
        counted_qty: record.payload.counted_qty,
        sync_state: record.sync_state.to_string(),
        attempt_count: record.attempt_count,
        last_error: record
            .last_error
            .as_ref()
            .map(|error| error.message.clone()),
        created_at: record.created_at,
        relative_time: format_relative_time(record.created_at, now_ms()),
    }
}

pub async fn run_pending(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = QueueService::open_path(db_path).await?;
    let records = service
        .list_pending(limit, now_ms(), DEFAULT_MAX_ATTEMPTS)
        .await?;

    if as_json {
        let items = records
            .iter()
            .map(submission_to_item)
            .collect::<Vec<PendingItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    let now = now_ms();
    for record in &records {
        println!(
            "{:<13}  {:<12}  {:<16}  qty {:<5}  {:<8}  {}",
            short_id(&record.client_id.to_string()),
            record.payload.session_id,
            record.payload.item_code,
            record.payload.counted_qty,
            record.sync_state,
            format_relative_time(record.created_at, now),
        );
    }
    Ok(())
}

#[allow(clippy::struct_field_names)]
pub struct EnqueueArgs {
    pub session_id: String,
    pub item_code: String,
    pub counted_qty: u32,
    pub damaged_qty: u32,
    pub batch_id: Option<String>,
    pub remark: Option<String>,
    pub floor_no: Option<String>,
    pub rack_no: Option<String>,
    pub serial_numbers: Vec<String>,
}

pub async fn run_enqueue(args: EnqueueArgs, db_path: &Path) -> Result<(), CliError> {
    let service = QueueService::open_path(db_path).await?;

    let payload = NewSubmission {
        batch_id: args.batch_id,
        damaged_qty: args.damaged_qty,
        remark: args.remark,
        floor_no: args.floor_no,
        rack_no: args.rack_no,
        serial_numbers: args.serial_numbers,
        ..NewSubmission::new(args.session_id, args.item_code, args.counted_qty)
    };

    let record = service.enqueue(&payload).await?;
    tracing::info!(
        client_id = %record.client_id,
        item_code = %record.payload.item_code,
        "submission enqueued"
    );
    println!("{}", record.client_id);
    Ok(())
}

pub async fn run_purge(older_than_days: u32, db_path: &Path) -> Result<(), CliError> {
    let service = QueueService::open_path(db_path).await?;
    let cutoff = now_ms().saturating_sub(i64::from(older_than_days) * 24 * 60 * 60 * 1000);

    let purged = service.purge_synced(cutoff).await?;
    tracing::info!(purged, older_than_days, "purged synced records");
    println!("Purged {purged} synced record(s)");
    Ok(())
}
