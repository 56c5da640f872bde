//! Filesystem storage implementation.
//!
//! Provides [`FsStorage`] for reading templates from the local filesystem and
//! listing template directories with `glob` patterns.

use std::fs;
use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

use crate::storage::{Storage, StorageError, StorageErrorKind};

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// Match options for directory scans.
///
/// Hidden files and directories are only matched by patterns that spell out
/// the leading dot, which template scans never do.
const SCAN_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Filesystem storage implementation.
///
/// Stateless: every call hits the filesystem. Caching and deduplication of
/// concurrent reads are the view engine's responsibility.
///
/// # Example
///
/// ```ignore
/// use std::path::Path;
/// use trellis_storage::{FsStorage, Storage};
///
/// let storage = FsStorage::new();
/// let source = storage.read(Path::new("views/home.hbs"))?;
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl FsStorage {
    /// Create a new filesystem storage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the recursive glob pattern for `dir` and `suffix`.
    fn scan_pattern(dir: &Path, suffix: &str) -> Result<String, StorageError> {
        let dir_str = dir.to_str().ok_or_else(|| {
            StorageError::new(StorageErrorKind::InvalidPath)
                .with_path(dir)
                .with_backend(BACKEND)
        })?;
        let root = dir_str.trim_end_matches('/');

        Ok(format!(
            "{}/**/*{}",
            Pattern::escape(root),
            Pattern::escape(suffix)
        ))
    }
}

/// Render a path relative to the scan root with `/` separators.
fn relative_name(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> Result<String, StorageError> {
        fs::read_to_string(path)
            .map_err(|e| StorageError::io(e, Some(path.to_path_buf())).with_backend(BACKEND))
    }

    fn scan(&self, dir: &Path, suffix: &str) -> Result<Vec<String>, StorageError> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "template directory does not exist");
            return Ok(Vec::new());
        }
        if !dir.is_dir() {
            return Err(StorageError::new(StorageErrorKind::InvalidPath)
                .with_path(dir)
                .with_backend(BACKEND));
        }

        let pattern = Self::scan_pattern(dir, suffix)?;
        let paths = glob::glob_with(&pattern, SCAN_OPTIONS).map_err(|e| {
            StorageError::new(StorageErrorKind::InvalidPath)
                .with_path(dir)
                .with_backend(BACKEND)
                .with_source(e)
        })?;

        let mut names = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                StorageError::io(std::io::Error::from(e), Some(path)).with_backend(BACKEND)
            })?;
            if !path.is_file() {
                continue;
            }
            if let Some(name) = relative_name(&path, dir) {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}
