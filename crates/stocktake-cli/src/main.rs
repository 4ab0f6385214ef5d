//! Stocktake CLI - supervisor tooling for the offline count queue
//!
//! Inspect the pending queue, review and resolve sync conflicts, and run
//! manual drain passes against the backend.

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stocktake_core::models::Resolution;

mod commands;
mod error;

use commands::queue::EnqueueArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "stocktake")]
#[command(about = "Supervisor tooling for the offline count queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local queue database file
    #[arg(long, global = true, value_name = "PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show aggregate queue status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List records waiting to sync
    Pending {
        /// Number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Capture a count submission into the queue
    Enqueue {
        /// Counting session identifier
        session_id: String,
        /// Item code that was counted
        item_code: String,
        /// Counted quantity
        counted_qty: u32,
        /// Damaged quantity
        #[arg(long, default_value = "0")]
        damaged_qty: u32,
        /// Batch identifier
        #[arg(long)]
        batch_id: Option<String>,
        /// Free-form remark
        #[arg(long)]
        remark: Option<String>,
        /// Floor number
        #[arg(long)]
        floor_no: Option<String>,
        /// Rack number
        #[arg(long)]
        rack_no: Option<String>,
        /// Serial numbers (repeatable)
        #[arg(long = "serial")]
        serial_numbers: Vec<String>,
    },
    /// List sync conflicts
    Conflicts {
        /// Only conflicts for this session
        #[arg(long)]
        session: Option<String>,
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve an open conflict
    Resolve {
        /// Client ID of the conflicted submission
        client_id: String,
        /// Which side wins
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
    /// Run one drain pass against the backend
    Drain {
        /// Backend base URL (falls back to STOCKTAKE_API_URL)
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "15")]
        timeout_secs: u64,
    },
    /// Garbage-collect old synced records
    Purge {
        /// Retention window in days
        #[arg(long, default_value = "7")]
        older_than_days: u32,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum KeepSide {
    Local,
    Remote,
    Merged,
}

impl From<KeepSide> for Resolution {
    fn from(side: KeepSide) -> Self {
        match side {
            KeepSide::Local => Self::ResolvedKeepLocal,
            KeepSide::Remote => Self::ResolvedKeepRemote,
            KeepSide::Merged => Self::ResolvedMerged,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stocktake=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Status { json } => commands::queue::run_status(json, &db_path).await?,
        Commands::Pending { limit, json } => {
            commands::queue::run_pending(limit, json, &db_path).await?;
        }
        Commands::Enqueue {
            session_id,
            item_code,
            counted_qty,
            damaged_qty,
            batch_id,
            remark,
            floor_no,
            rack_no,
            serial_numbers,
        } => {
            commands::queue::run_enqueue(
                EnqueueArgs {
                    session_id,
                    item_code,
                    counted_qty,
                    damaged_qty,
                    batch_id,
                    remark,
                    floor_no,
                    rack_no,
                    serial_numbers,
                },
                &db_path,
            )
            .await?;
        }
        Commands::Conflicts {
            session,
            limit,
            json,
        } => {
            commands::conflicts::run_conflicts(session.as_deref(), limit, json, &db_path).await?;
        }
        Commands::Resolve { client_id, keep } => {
            commands::conflicts::run_resolve(&client_id, keep.into(), &db_path).await?;
        }
        Commands::Drain {
            endpoint,
            timeout_secs,
        } => {
            let endpoint =
                commands::drain::resolve_endpoint(endpoint, env::var("STOCKTAKE_API_URL").ok());
            commands::drain::run_drain(endpoint, timeout_secs, &db_path).await?;
        }
        Commands::Purge { older_than_days } => {
            commands::queue::run_purge(older_than_days, &db_path).await?;
        }
    }

    Ok(())
}

fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("STOCKTAKE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("stocktake.db"))
}
