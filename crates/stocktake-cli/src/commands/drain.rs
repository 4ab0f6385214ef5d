//! Manual drain command: run one sync pass against the backend

use std::path::Path;
use std::time::Duration;

use stocktake_core::backend::HttpCountBackend;
use stocktake_core::connectivity::ConnectivityMonitor;
use stocktake_core::engine::{EngineConfig, SyncEngine};
use stocktake_core::QueueService;

use crate::error::CliError;

/// Pick the backend endpoint from the `--endpoint` flag, falling back to the
/// environment value; blank values count as absent
pub fn resolve_endpoint(flag: Option<String>, env_value: Option<String>) -> Option<String> {
    flag.or(env_value)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn run_drain(
    endpoint: Option<String>,
    timeout_secs: u64,
    db_path: &Path,
) -> Result<(), CliError> {
    let endpoint = endpoint.ok_or(CliError::EndpointNotConfigured)?;

    let backend = HttpCountBackend::with_timeout(endpoint, Duration::from_secs(timeout_secs))?;
    let queue = QueueService::open_path(db_path).await?;
    // Manual drain implies the operator believes the device is online.
    let monitor = ConnectivityMonitor::new(true);
    let engine = SyncEngine::new(queue, backend, monitor, EngineConfig::default());

    let summary = engine.drain_pass().await?;
    if summary.skipped {
        println!("Drain skipped");
        return Ok(());
    }

    tracing::info!(
        synced = summary.synced,
        conflicts = summary.conflicts,
        failed = summary.failed,
        "manual drain completed"
    );
    println!(
        "Drain completed: {} synced, {} conflicts, {} failed",
        summary.synced, summary.conflicts, summary.failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolve_endpoint_prefers_flag_and_ignores_blanks() {
        assert_eq!(
            resolve_endpoint(
                Some("https://flag.example".to_string()),
                Some("https://env.example".to_string()),
            ),
            Some("https://flag.example".to_string())
        );
        assert_eq!(
            resolve_endpoint(None, Some("https://env.example".to_string())),
            Some("https://env.example".to_string())
        );
        assert_eq!(resolve_endpoint(None, Some("   ".to_string())), None);
        assert_eq!(resolve_endpoint(None, None), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drain_requires_endpoint() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("queue.db");

        let error = run_drain(None, 15, &db_path).await.unwrap_err();
        assert!(matches!(error, CliError::EndpointNotConfigured));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drain_rejects_invalid_endpoint() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("queue.db");

        let error = run_drain(Some("not-a-url".to_string()), 15, &db_path)
            .await
            .unwrap_err();
        assert!(matches!(error, CliError::Backend(_)));
    }
}
