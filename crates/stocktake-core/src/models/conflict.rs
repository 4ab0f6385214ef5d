//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ClientId;

/// Why the backend refused to apply a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Server state changed since the count was captured
    StaleBase,
    /// A serial number was already counted elsewhere
    DuplicateSerial,
    /// The counting session was closed before the submission arrived
    SessionClosed,
}

impl ConflictType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StaleBase => "STALE_BASE",
            Self::DuplicateSerial => "DUPLICATE_SERIAL",
            Self::SessionClosed => "SESSION_CLOSED",
        }
    }
}

impl FromStr for ConflictType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STALE_BASE" => Ok(Self::StaleBase),
            "DUPLICATE_SERIAL" => Ok(Self::DuplicateSerial),
            "SESSION_CLOSED" => Ok(Self::SessionClosed),
            other => Err(format!("unknown conflict type: {other}")),
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor decision applied to an open conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Open,
    ResolvedKeepLocal,
    ResolvedKeepRemote,
    ResolvedMerged,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::ResolvedKeepLocal => "RESOLVED_KEEP_LOCAL",
            Self::ResolvedKeepRemote => "RESOLVED_KEEP_REMOTE",
            Self::ResolvedMerged => "RESOLVED_MERGED",
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "RESOLVED_KEEP_LOCAL" => Ok(Self::ResolvedKeepLocal),
            "RESOLVED_KEEP_REMOTE" => Ok(Self::ResolvedKeepRemote),
            "RESOLVED_MERGED" => Ok(Self::ResolvedMerged),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}

/// Recorded conflict awaiting (or carrying) supervisor resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict row identifier
    pub id: i64,
    /// Submission involved in the conflict
    pub client_id: ClientId,
    /// Session the submission belongs to
    pub session_id: String,
    pub conflict_type: ConflictType,
    /// The submission payload as captured on-device
    pub local_snapshot: serde_json::Value,
    /// The server-side record returned with the 409
    pub remote_snapshot: serde_json::Value,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
    pub resolution_state: Resolution,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_type_roundtrip() {
        for conflict_type in [
            ConflictType::StaleBase,
            ConflictType::DuplicateSerial,
            ConflictType::SessionClosed,
        ] {
            assert_eq!(
                conflict_type.as_str().parse::<ConflictType>().unwrap(),
                conflict_type
            );
        }
        assert!("LOST_UPDATE".parse::<ConflictType>().is_err());
    }

    #[test]
    fn test_resolution_roundtrip() {
        for resolution in [
            Resolution::Open,
            Resolution::ResolvedKeepLocal,
            Resolution::ResolvedKeepRemote,
            Resolution::ResolvedMerged,
        ] {
            assert_eq!(
                resolution.as_str().parse::<Resolution>().unwrap(),
                resolution
            );
        }
    }
}
