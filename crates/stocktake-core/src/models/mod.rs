//! Data models for Stocktake

mod conflict;
mod status;
mod submission;

pub use conflict::{ConflictRecord, ConflictType, Resolution};
pub use status::{QueueCounts, SyncStatus};
pub use submission::{
    ClientId, ErrorKind, LastError, NewSubmission, PendingSubmission, SyncState,
};
