//! Error types for sheetsync-engine.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote service answered with a non-success status.
    #[error("remote error {status} on {operation}: {message}")]
    Remote {
        status: u16,
        operation: &'static str,
        message: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("transport error on {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered 2xx with a body we could not decode.
    #[error("unexpected response on {operation}: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    /// No access token could be obtained for the remote service.
    #[error("credentials unavailable: {0}")]
    Credentials(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (checksum store).
    #[error("checksum store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// HTTP-like status used by the retry executor to classify the failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Remote { status, .. } => Some(*status),
            SyncError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
