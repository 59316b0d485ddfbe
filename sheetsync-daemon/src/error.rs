use std::path::PathBuf;

use thiserror::Error;

/// Error surface for daemon configuration, startup, and task management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry error: {0}")]
    Registry(#[from] sheetsync_core::RegistryError),

    #[error("sync error: {0}")]
    Sync(#[from] sheetsync_engine::SyncError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
