use std::io;

use stocktake_core::backend::SubmitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stocktake_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(#[from] SubmitError),
    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),
    #[error(
        "No backend endpoint configured. Pass --endpoint or set STOCKTAKE_API_URL to enable `stocktake drain`."
    )]
    EndpointNotConfigured,
}
