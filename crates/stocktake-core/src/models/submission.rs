//! Pending submission model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Client-generated idempotency key for a count submission, using UUID v7
/// (time-sortable). Assigned once at creation and never changed; the backend
/// treats replays of the same id as already-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new unique client ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Per-record sync lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    Pending,
    Syncing,
    Synced,
    Conflict,
    Failed,
}

impl SyncState {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Syncing => "SYNCING",
            Self::Synced => "SYNCED",
            Self::Conflict => "CONFLICT",
            Self::Failed => "FAILED",
        }
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCING" => Ok(Self::Syncing),
            "SYNCED" => Ok(Self::Synced),
            "CONFLICT" => Ok(Self::Conflict),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown sync state: {other}")),
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the last failure recorded on a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeout, connection refused, 5xx - eligible for another attempt
    Retryable,
    /// 4xx rejection other than conflict - requires operator attention
    NonRetryable,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::NonRetryable => "non_retryable",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retryable" => Ok(Self::Retryable),
            "non_retryable" => Ok(Self::NonRetryable),
            other => Err(format!("unknown error kind: {other}")),
        }
    }
}

/// Last failure recorded on a submission, cleared on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Payload for a count event as produced by the scanning workflow.
///
/// Everything except `session_id`, `item_code` and the quantities is
/// optional; the quantities are non-negative by construction (`u32`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubmission {
    pub session_id: String,
    pub item_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    pub counted_qty: u32,
    #[serde(default)]
    pub damaged_qty: u32,
    #[serde(default)]
    pub non_returnable_damaged_qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrp_counted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_correction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturing_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_no: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub serial_numbers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_reference: Option<String>,
}

impl NewSubmission {
    /// Minimal payload for a counted quantity
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        item_code: impl Into<String>,
        counted_qty: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            item_code: item_code.into(),
            counted_qty,
            ..Self::default()
        }
    }

    /// Reject payloads that must never enter the queue
    pub fn validate(&self) -> Result<(), String> {
        if self.session_id.trim().is_empty() {
            return Err("session_id must not be empty".to_string());
        }
        if self.item_code.trim().is_empty() {
            return Err("item_code must not be empty".to_string());
        }
        Ok(())
    }
}

/// A queued count event: payload plus sync bookkeeping.
///
/// Owned by the durable local queue; the sync engine only holds a transient
/// lease (`SYNCING`) while a record is being submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub client_id: ClientId,
    #[serde(flatten)]
    pub payload: NewSubmission,
    pub sync_state: SyncState,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Earliest unix-ms timestamp at which another attempt may run
    pub next_attempt_at: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last state-change timestamp (Unix ms)
    pub updated_at: i64,
}

impl PendingSubmission {
    /// Create a fresh PENDING record for the given payload
    #[must_use]
    pub fn new(payload: NewSubmission) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            client_id: ClientId::new(),
            payload,
            sync_state: SyncState::Pending,
            attempt_count: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_unique() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_client_id_parse() {
        let id = ClientId::new();
        let parsed: ClientId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_sync_state_roundtrip() {
        for state in [
            SyncState::Pending,
            SyncState::Syncing,
            SyncState::Synced,
            SyncState::Conflict,
            SyncState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<SyncState>().unwrap(), state);
        }
        assert!("bogus".parse::<SyncState>().is_err());
    }

    #[test]
    fn test_new_submission_validation() {
        assert!(NewSubmission::new("S-1", "A1", 5).validate().is_ok());
        assert!(NewSubmission::new("  ", "A1", 5).validate().is_err());
        assert!(NewSubmission::new("S-1", "", 5).validate().is_err());
    }

    #[test]
    fn test_pending_submission_new() {
        let record = PendingSubmission::new(NewSubmission::new("S-1", "A1", 5));
        assert_eq!(record.sync_state, SyncState::Pending);
        assert_eq!(record.attempt_count, 0);
        assert!(record.last_error.is_none());
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.created_at > 0);
    }

    #[test]
    fn test_payload_json_omits_empty_optionals() {
        let json = serde_json::to_string(&NewSubmission::new("S-1", "A1", 5)).unwrap();
        assert!(!json.contains("remark"));
        assert!(!json.contains("serial_numbers"));
        assert!(json.contains("\"counted_qty\":5"));
    }
}
