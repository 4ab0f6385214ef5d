//! Backend count-line submission client
//!
//! The backend treats `client_id` as an idempotency key: replays of an
//! already-applied submission return success, a closed session or duplicate
//! serial returns `409` with a structured conflict payload.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ConflictType, NewSubmission, PendingSubmission};
use crate::retry::Retryable;

/// Default per-request timeout; exceeding it is a retryable failure
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Successful backend verdict on one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Applied, or already applied under the same `client_id`
    Applied,
    /// The backend refused the submission without ambiguity being resolvable
    /// on its side; carries the server's view of the record
    Conflict {
        conflict_type: ConflictType,
        remote: serde_json::Value,
    },
}

/// Transport and rejection failures for one submission attempt.
///
/// Conflicts are deliberately *not* an error: they arrive as
/// [`SubmitOutcome::Conflict`] so the retry wrapper never burns attempts on
/// them.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid backend configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Server error: {message} ({status})")]
    Server { status: u16, message: String },
    #[error("Rejected by backend: {message} ({status})")]
    Rejected { status: u16, message: String },
}

impl Retryable for SubmitError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::Server { .. } => true,
            Self::InvalidConfiguration(_) | Self::Rejected { .. } => false,
        }
    }
}

/// Seam between the sync engine and the backend; the engine is generic over
/// it so drain scenarios are testable without a network
pub trait CountBackend {
    /// Submit one count line, idempotent on the record's `client_id`
    fn submit(
        &self,
        submission: &PendingSubmission,
    ) -> impl std::future::Future<Output = Result<SubmitOutcome, SubmitError>> + Send;
}

/// HTTP implementation of [`CountBackend`] against `POST {base}/count-lines`
#[derive(Debug, Clone)]
pub struct HttpCountBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpCountBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SubmitError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SubmitError> {
        let endpoint = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SubmitError::Transport(error.to_string()))?;

        Ok(Self {
            endpoint: format!("{endpoint}/count-lines"),
            client,
        })
    }
}

impl CountBackend for HttpCountBackend {
    async fn submit(
        &self,
        submission: &PendingSubmission,
    ) -> Result<SubmitOutcome, SubmitError> {
        let client_id = submission.client_id.as_str();
        let body = CountLineBody {
            client_id: &client_id,
            payload: &submission.payload,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Idempotency-Key", client_id.as_str())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(SubmitOutcome::Applied);
        }

        let body = response.text().await.unwrap_or_default();
        classify_rejection(status, &body)
    }
}

#[derive(Serialize)]
struct CountLineBody<'a> {
    client_id: &'a str,
    #[serde(flatten)]
    payload: &'a NewSubmission,
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    conflict_type: Option<String>,
    remote: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn classify_transport_error(error: reqwest::Error) -> SubmitError {
    if error.is_timeout() {
        SubmitError::Timeout
    } else {
        SubmitError::Transport(error.to_string())
    }
}

/// Map a non-2xx response to an outcome or error.
///
/// Unknown conflict types map to STALE_BASE so a 409 is never dropped.
fn classify_rejection(status: StatusCode, body: &str) -> Result<SubmitOutcome, SubmitError> {
    if status == StatusCode::CONFLICT {
        let parsed = serde_json::from_str::<ConflictBody>(body).unwrap_or(ConflictBody {
            conflict_type: None,
            remote: None,
        });
        let conflict_type = parsed
            .conflict_type
            .and_then(|raw| raw.parse::<ConflictType>().ok())
            .unwrap_or(ConflictType::StaleBase);

        return Ok(SubmitOutcome::Conflict {
            conflict_type,
            remote: parsed.remote.unwrap_or(serde_json::Value::Null),
        });
    }

    let message = parse_api_error(status, body);
    if status.is_server_error() {
        Err(SubmitError::Server {
            status: status.as_u16(),
            message,
        })
    } else {
        Err(SubmitError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

fn normalize_base_url(raw: String) -> Result<String, SubmitError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SubmitError::InvalidConfiguration(
            "base URL must not be empty".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.trim_end_matches('/').to_string())
    } else {
        Err(SubmitError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn test_conflict_response_maps_to_outcome() {
        let body = json!({
            "conflict_type": "SESSION_CLOSED",
            "remote": {"counted_qty": 8}
        })
        .to_string();

        let outcome = classify_rejection(StatusCode::CONFLICT, &body).unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Conflict {
                conflict_type: ConflictType::SessionClosed,
                remote: json!({"counted_qty": 8}),
            }
        );
    }

    #[test]
    fn test_unknown_conflict_type_falls_back_to_stale_base() {
        let outcome = classify_rejection(StatusCode::CONFLICT, "{}").unwrap();
        assert!(matches!(
            outcome,
            SubmitOutcome::Conflict {
                conflict_type: ConflictType::StaleBase,
                ..
            }
        ));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let error = classify_rejection(StatusCode::BAD_GATEWAY, "").unwrap_err();
        assert!(error.is_retryable());
        assert!(matches!(error, SubmitError::Server { status: 502, .. }));
    }

    #[test]
    fn test_validation_rejections_are_not_retryable() {
        let body = json!({"message": "unknown item code"}).to_string();
        let error = classify_rejection(StatusCode::UNPROCESSABLE_ENTITY, &body).unwrap_err();

        assert!(!error.is_retryable());
        match error {
            SubmitError::Rejected { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "unknown item code");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_api_error_falls_back_to_status() {
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, "plain text"),
            "plain text"
        );
    }
}
