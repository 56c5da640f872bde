//! Mock storage implementation for testing.
//!
//! Provides [`MockStorage`] for unit testing without filesystem access. Besides
//! serving in-memory files it records how often each path was read or scanned,
//! can be told to fail reads for a path, and can hold reads or scans at a gate
//! so tests can line up concurrent callers deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Condvar, Mutex, RwLock};

use crate::storage::{Storage, StorageError, StorageErrorKind};

/// Backend identifier for error messages.
const BACKEND: &str = "Mock";

#[derive(Debug, Default)]
struct GateState {
    held: bool,
    blocked: usize,
}

/// Blocks callers while held.
#[derive(Debug, Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    fn hold(&self) {
        self.state.lock().unwrap().held = true;
    }

    fn release(&self) {
        self.state.lock().unwrap().held = false;
        self.changed.notify_all();
    }

    fn blocked(&self) -> usize {
        self.state.lock().unwrap().blocked
    }

    fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.held {
            return;
        }
        state.blocked += 1;
        while state.held {
            state = self.changed.wait(state).unwrap();
        }
        state.blocked -= 1;
    }
}

/// Mock storage for testing.
///
/// Stores template sources in memory. Use the builder methods to configure the
/// mock with test data.
///
/// # Example
///
/// ```ignore
/// use std::path::Path;
/// use trellis_storage::{MockStorage, Storage};
///
/// let storage = MockStorage::new()
///     .with_file("/views/home.hbs", "<h1>Hi</h1>")
///     .with_file("/views/partials/nav.hbs", "<nav></nav>");
///
/// let content = storage.read(Path::new("/views/home.hbs")).unwrap();
/// assert_eq!(storage.read_count("/views/home.hbs"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockStorage {
    files: RwLock<BTreeMap<PathBuf, String>>,
    reads: Mutex<HashMap<PathBuf, usize>>,
    scans: Mutex<HashMap<PathBuf, usize>>,
    failing: RwLock<HashSet<PathBuf>>,
    read_gate: Gate,
    scan_gate: Gate,
}

impl MockStorage {
    /// Create a new empty mock storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with the given content.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file after construction.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .write()
            .unwrap()
            .insert(path.into(), content.into());
    }

    /// Remove a file.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.write().unwrap().remove(path.as_ref());
    }

    /// Number of `read` calls made for `path`, including failed ones.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .lock()
            .unwrap()
            .get(path.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Number of `read` calls across all paths.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn total_reads(&self) -> usize {
        self.reads.lock().unwrap().values().sum()
    }

    /// Number of `scan` calls made for `dir`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn scan_count(&self, dir: impl AsRef<Path>) -> usize {
        self.scans
            .lock()
            .unwrap()
            .get(dir.as_ref())
            .copied()
            .unwrap_or(0)
    }

    /// Make every subsequent read of `path` fail with an `Other` error.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn fail_reads(&self, path: impl Into<PathBuf>) {
        self.failing.write().unwrap().insert(path.into());
    }

    /// Undo [`fail_reads`](Self::fail_reads) for `path`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn restore_reads(&self, path: impl AsRef<Path>) {
        self.failing.write().unwrap().remove(path.as_ref());
    }

    /// Block every subsequent read until [`release_reads`](Self::release_reads).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn hold_reads(&self) {
        self.read_gate.hold();
    }

    /// Let held and future reads proceed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn release_reads(&self) {
        self.read_gate.release();
    }

    /// Number of reads currently blocked at the gate.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn blocked_reads(&self) -> usize {
        self.read_gate.blocked()
    }

    /// Block every subsequent scan until [`release_scans`](Self::release_scans).
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn hold_scans(&self) {
        self.scan_gate.hold();
    }

    /// Let held and future scans proceed.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn release_scans(&self) {
        self.scan_gate.release();
    }

    /// Number of scans currently blocked at the gate.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn blocked_scans(&self) -> usize {
        self.scan_gate.blocked()
    }
}

/// Relative `/`-separated name of `path` below `dir`, skipping hidden entries.
fn visible_relative_name(path: &Path, dir: &Path) -> Option<String> {
    let rel = path.strip_prefix(dir).ok()?;
    let mut parts = Vec::new();
    for component in rel.components() {
        let Component::Normal(part) = component else {
            return None;
        };
        let part = part.to_str()?;
        if part.starts_with('.') {
            return None;
        }
        parts.push(part);
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

impl Storage for MockStorage {
    fn read(&self, path: &Path) -> Result<String, StorageError> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;

        self.read_gate.pass();

        if self.failing.read().unwrap().contains(path) {
            return Err(StorageError::new(StorageErrorKind::Other)
                .with_path(path)
                .with_backend(BACKEND));
        }

        self.files
            .read()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                StorageError::new(StorageErrorKind::NotFound)
                    .with_path(path)
                    .with_backend(BACKEND)
            })
    }

    fn scan(&self, dir: &Path, suffix: &str) -> Result<Vec<String>, StorageError> {
        *self
            .scans
            .lock()
            .unwrap()
            .entry(dir.to_path_buf())
            .or_default() += 1;

        self.scan_gate.pass();

        let mut names: Vec<String> = self
            .files
            .read()
            .unwrap()
            .keys()
            .filter_map(|path| visible_relative_name(path, dir))
            .filter(|name| name.ends_with(suffix))
            .collect();
        names.sort();
        Ok(names)
    }
}
