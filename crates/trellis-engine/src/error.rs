use std::path::{Path, PathBuf};
use std::sync::Arc;

use trellis_storage::{StorageError, StorageErrorKind};

/// Error returned by view engine operations.
///
/// Cloneable so that one failed load can be handed to every caller waiting on
/// it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Template file or directory does not exist.
    #[error("Template not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Storage backend failure other than a missing file.
    #[error("Storage error: {0}")]
    Storage(#[source] Arc<StorageError>),
    /// Template source failed to compile.
    #[error("Failed to compile {}: {message}", path.display())]
    Compile {
        /// Template file.
        path: PathBuf,
        /// Compiler message.
        message: String,
    },
    /// Compiled template failed while rendering.
    #[error("Failed to render {}: {message}", path.display())]
    Render {
        /// Template file.
        path: PathBuf,
        /// Renderer message.
        message: String,
    },
    /// Engine options are invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn compile(path: &Path, message: impl Into<String>) -> Self {
        Self::Compile {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn render(path: &Path, message: impl Into<String>) -> Self {
        Self::Render {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        match (e.kind, e.path()) {
            (StorageErrorKind::NotFound, Some(path)) => Self::NotFound(path.to_path_buf()),
            _ => Self::Storage(Arc::new(e)),
        }
    }
}

impl From<trellis_config::ConfigError> for Error {
    fn from(e: trellis_config::ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}
