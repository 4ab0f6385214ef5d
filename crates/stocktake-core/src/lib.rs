//! stocktake-core - Core library for Stocktake
//!
//! Offline-first count capture and synchronization: durable local queue,
//! duplicate-scan suppression, connectivity-driven drain loop, bounded
//! retry, and conflict registry. Consumed by the scanning workflow and by
//! supervisor tooling (CLI); the UI layers live elsewhere.

pub mod backend;
pub mod connectivity;
pub mod db;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod models;
pub mod retry;
pub mod service;

pub use error::{Error, Result};
pub use models::{ClientId, NewSubmission, PendingSubmission, SyncState};
pub use service::QueueService;
