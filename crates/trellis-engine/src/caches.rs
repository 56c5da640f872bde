use std::path::PathBuf;
use std::sync::Arc;

use trellis_cache::Memo;

use crate::error::Error;

/// The four caches behind a view engine.
///
/// Every cache is keyed by absolute path and deduplicates concurrent loads of
/// the same key. One instance is owned by each [`ViewEngine`] unless engines
/// are explicitly given a shared one with
/// [`ViewEngine::with_caches`].
///
/// [`ViewEngine`]: crate::ViewEngine
/// [`ViewEngine::with_caches`]: crate::ViewEngine::with_caches
pub struct TemplateCaches<T> {
    pub(crate) files: Memo<PathBuf, Arc<str>, Error>,
    pub(crate) dirs: Memo<PathBuf, Vec<String>, Error>,
    pub(crate) compiled: Memo<PathBuf, T, Error>,
    pub(crate) precompiled: Memo<PathBuf, Arc<str>, Error>,
}

impl<T> Default for TemplateCaches<T> {
    fn default() -> Self {
        Self {
            files: Memo::named("files"),
            dirs: Memo::named("dirs"),
            compiled: Memo::named("compiled"),
            precompiled: Memo::named("precompiled"),
        }
    }
}

impl<T> std::fmt::Debug for TemplateCaches<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCaches")
            .field("files", &self.files)
            .field("dirs", &self.dirs)
            .field("compiled", &self.compiled)
            .field("precompiled", &self.precompiled)
            .finish()
    }
}

impl<T> TemplateCaches<T> {
    /// Create an empty cache set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every resolved entry from all four caches.
    pub fn clear(&self) {
        self.files.clear();
        self.dirs.clear();
        self.compiled.clear();
        self.precompiled.clear();
    }

    /// Number of cached raw files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of cached directory listings.
    #[must_use]
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    /// Number of cached compiled templates.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled.len()
    }

    /// Number of cached precompiled templates.
    #[must_use]
    pub fn precompiled_count(&self) -> usize {
        self.precompiled.len()
    }
}
