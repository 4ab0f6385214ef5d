//! Sync engine
//!
//! Drains the durable queue toward the backend. A single engine task owns
//! every `sync_state` transition; connectivity transitions and a periodic
//! timer only wake it up. Records are processed strictly sequentially to
//! preserve count order within a session.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::backend::{CountBackend, SubmitOutcome};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::models::{ErrorKind, LastError, PendingSubmission, SyncStatus};
use crate::retry::{self, RetryError, RetryPolicy};
use crate::service::QueueService;

/// Tunables for the drain loop
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum records fetched per drain pass
    pub batch_size: usize,
    /// Periodic drain trigger while online
    pub drain_interval: Duration,
    /// Per-submission network retry schedule; `max_attempts` also caps the
    /// persisted per-record attempt count
    pub retry: RetryPolicy,
    /// How long SYNCED records are kept for audit before purging
    pub synced_retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            drain_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            synced_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Outcome tally of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub synced: u32,
    pub conflicts: u32,
    pub failed: u32,
    /// True when the pass did not run (offline, or another pass in flight)
    pub skipped: bool,
}

enum RecordOutcome {
    Synced,
    Conflict,
    Failed,
    Skipped,
}

/// Orchestrates queue draining against a backend
pub struct SyncEngine<B: CountBackend> {
    queue: QueueService,
    backend: B,
    monitor: ConnectivityMonitor,
    config: EngineConfig,
    drain_lock: tokio::sync::Mutex<()>,
    /// Unix ms of the last completed pass; 0 means none yet
    last_sync_at: AtomicI64,
}

impl<B: CountBackend> SyncEngine<B> {
    pub fn new(
        queue: QueueService,
        backend: B,
        monitor: ConnectivityMonitor,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            backend,
            monitor,
            config,
            drain_lock: tokio::sync::Mutex::new(()),
            last_sync_at: AtomicI64::new(0),
        }
    }

    /// Aggregate status for the supervisor screens
    pub async fn status(&self) -> Result<SyncStatus> {
        let counts = self.queue.counts(self.config.retry.max_attempts).await?;
        let last_sync_at = match self.last_sync_at.load(Ordering::Relaxed) {
            0 => None,
            at => Some(at),
        };

        Ok(SyncStatus {
            pending_count: counts.pending,
            failed_count: counts.failed,
            conflict_count: counts.conflicts,
            last_sync_at,
            is_online: self.monitor.is_online(),
        })
    }

    /// Run one drain pass.
    ///
    /// No-op while offline or while another pass is in flight. One record's
    /// failure never blocks the records after it.
    pub async fn drain_pass(&self) -> Result<DrainSummary> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            tracing::debug!("drain already in progress, skipping");
            return Ok(DrainSummary {
                skipped: true,
                ..DrainSummary::default()
            });
        };

        if !self.monitor.is_online() {
            tracing::debug!("offline, skipping drain");
            return Ok(DrainSummary {
                skipped: true,
                ..DrainSummary::default()
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        let batch = self
            .queue
            .list_pending(self.config.batch_size, now, self.config.retry.max_attempts)
            .await?;

        let mut summary = DrainSummary::default();
        for record in &batch {
            match self.process_record(record).await {
                RecordOutcome::Synced => summary.synced += 1,
                RecordOutcome::Conflict => summary.conflicts += 1,
                RecordOutcome::Failed => summary.failed += 1,
                RecordOutcome::Skipped => {}
            }
        }

        self.last_sync_at
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);

        if summary.synced > 0 || summary.conflicts > 0 || summary.failed > 0 {
            tracing::info!(
                synced = summary.synced,
                conflicts = summary.conflicts,
                failed = summary.failed,
                "drain pass completed"
            );
        }

        Ok(summary)
    }

    /// Submit one leased record and record the classified outcome.
    ///
    /// Queue bookkeeping failures are logged and swallowed so the pass
    /// continues with the next record.
    async fn process_record(&self, record: &PendingSubmission) -> RecordOutcome {
        let client_id = record.client_id;

        match self.queue.mark_syncing(&client_id).await {
            Ok(()) => {}
            Err(Error::AlreadyLeased(state)) => {
                tracing::debug!(%client_id, %state, "record not leasable, skipping");
                return RecordOutcome::Skipped;
            }
            Err(error) => {
                tracing::warn!(%client_id, %error, "failed to lease record");
                return RecordOutcome::Skipped;
            }
        }

        let submitted =
            retry::execute(&self.config.retry, || self.backend.submit(record)).await;

        let result = match submitted {
            Ok(outcome) => match outcome.value {
                SubmitOutcome::Applied => self
                    .queue
                    .mark_synced(&client_id)
                    .await
                    .map(|()| RecordOutcome::Synced),
                SubmitOutcome::Conflict {
                    conflict_type,
                    remote,
                } => {
                    tracing::warn!(%client_id, %conflict_type, "backend reported conflict");
                    self.queue
                        .record_conflict(record, conflict_type, remote)
                        .await
                        .map(|_| RecordOutcome::Conflict)
                }
            },
            Err(RetryError::Exhausted { attempts, last }) => {
                let error = LastError {
                    kind: ErrorKind::Retryable,
                    message: last.to_string(),
                };
                tracing::warn!(%client_id, attempts, %last, "submission failed after retries");
                self.queue
                    .mark_failed(&client_id, &error, self.next_attempt_at(record))
                    .await
                    .map(|()| RecordOutcome::Failed)
            }
            Err(RetryError::NonRetryable(rejection)) => {
                let error = LastError {
                    kind: ErrorKind::NonRetryable,
                    message: rejection.to_string(),
                };
                tracing::warn!(%client_id, %rejection, "submission rejected");
                self.queue
                    .mark_failed(&client_id, &error, chrono::Utc::now().timestamp_millis())
                    .await
                    .map(|()| RecordOutcome::Failed)
            }
        };

        result.unwrap_or_else(|error| {
            tracing::error!(%client_id, %error, "failed to record submission outcome");
            RecordOutcome::Skipped
        })
    }

    /// Cross-pass backoff: grows with the record's persisted attempt count
    /// so a suspend/restart does not reset the schedule
    fn next_attempt_at(&self, record: &PendingSubmission) -> i64 {
        let delay = self.config.retry.delay_for(record.attempt_count + 2);
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        chrono::Utc::now().timestamp_millis().saturating_add(delay_ms)
    }

    /// Drive the engine until the task is dropped: drains on every
    /// offline-to-online transition and on the periodic timer, and purges
    /// expired SYNCED records after each pass
    pub async fn run(&self) {
        let mut connectivity = self.monitor.subscribe();
        let mut ticker = tokio::time::interval(self.config.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        // Monitor dropped; nothing can wake us for transitions
                        tracing::warn!("connectivity monitor closed, stopping engine loop");
                        return;
                    }
                    if !*connectivity.borrow_and_update() {
                        continue;
                    }
                    tracing::info!("connectivity restored, starting drain");
                }
            }

            if let Err(error) = self.drain_pass().await {
                tracing::error!(%error, "drain pass failed");
            }

            let retention_ms =
                i64::try_from(self.config.synced_retention.as_millis()).unwrap_or(i64::MAX);
            let cutoff = chrono::Utc::now()
                .timestamp_millis()
                .saturating_sub(retention_ms);
            match self.queue.purge_synced(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "purged synced records"),
                Err(error) => tracing::warn!(%error, "purge failed"),
            }
        }
    }
}
