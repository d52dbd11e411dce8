//! Error types for the library seams.

use uuid::Uuid;

/// Account-service client errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("credentials rejected")]
    Unauthorized,
    #[error("account service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid user config: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Capability probe failures. Never surfaced past the probe; every variant
/// degrades the classification to plain.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("no bearer token")]
    NoToken,
}

/// Session-level command errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown network {0}")]
    UnknownNetwork(Uuid),
    #[error("network {0} is no longer running")]
    RunnerGone(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("probe client: {0}")]
    Probe(#[from] ProbeError),
}
