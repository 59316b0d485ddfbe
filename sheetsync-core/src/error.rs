//! Error types for sheetsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from mapping registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure, with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse mapping registry at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.sheetsync/`.
    #[error("cannot determine home directory; set $HOME or SHEETSYNC_DATA_DIR")]
    HomeNotFound,

    /// A required mapping field was absent or blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// No mapping with the given id.
    #[error("mapping not found: {0}")]
    MappingNotFound(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RegistryError {
    RegistryError::Io {
        path: path.into(),
        source,
    }
}
