use thiserror::Error;

/// Errors surfaced by the collaborators the coordinator talks to
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    Validation(String),
}
