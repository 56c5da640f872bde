//! View engine instance and its I/O layer.
//!
//! [`ViewEngine`] ties a [`Compiler`], a [`Storage`] backend and a
//! [`TemplateCaches`] set to one [`ViewsConfig`]. Template compilation,
//! partial collection and rendering are implemented in sibling modules as
//! further `impl` blocks on the same type.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use trellis_config::ViewsConfig;
use trellis_storage::Storage;

use crate::caches::TemplateCaches;
use crate::compiler::{Compiler, HelperMap};
use crate::error::Error;
use crate::handlebars::HandlebarsCompiler;
use crate::layout::{absolute, join_root};
use crate::version::supports_slash_partials;

/// Template view engine.
///
/// Safe to share between threads; wrap it in an [`Arc`] to use
/// [`render_view`](Self::render_view).
pub struct ViewEngine<C: Compiler = HandlebarsCompiler> {
    pub(crate) config: ViewsConfig,
    pub(crate) compiler: Arc<C>,
    pub(crate) helpers: HelperMap<C::Helper>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) caches: Arc<TemplateCaches<C::Template>>,
    pub(crate) slash_partials: bool,
}

impl<C: Compiler> std::fmt::Debug for ViewEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut helpers: Vec<&String> = self.helpers.keys().collect();
        helpers.sort();
        f.debug_struct("ViewEngine")
            .field("config", &self.config)
            .field("compiler_version", &self.compiler.version())
            .field("helpers", &helpers)
            .field("caches", &self.caches)
            .field("slash_partials", &self.slash_partials)
            .finish_non_exhaustive()
    }
}

impl ViewEngine<HandlebarsCompiler> {
    /// Create an engine using the default Handlebars compiler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn handlebars(storage: Arc<dyn Storage>, config: ViewsConfig) -> Result<Self, Error> {
        Self::new(storage, config, HandlebarsCompiler::new())
    }
}

impl<C: Compiler> ViewEngine<C> {
    /// Create an engine with its own, empty caches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn new(storage: Arc<dyn Storage>, config: ViewsConfig, compiler: C) -> Result<Self, Error> {
        config.validate()?;

        let slash_partials = supports_slash_partials(compiler.version());
        if !slash_partials {
            tracing::debug!(
                version = compiler.version(),
                "Compiler cannot resolve '/' in partial names, joining with '.'"
            );
        }

        Ok(Self {
            config,
            compiler: Arc::new(compiler),
            helpers: HelperMap::new(),
            storage,
            caches: Arc::new(TemplateCaches::new()),
            slash_partials,
        })
    }

    /// Register a helper for every render of this engine.
    ///
    /// Overrides a compiler helper of the same name and is itself overridden
    /// by per-render helpers.
    #[must_use]
    pub fn with_helper(mut self, name: impl Into<String>, helper: C::Helper) -> Self {
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Use `caches` instead of this engine's own caches.
    ///
    /// Only share a cache set between engines with the same configuration and
    /// compiler: entries are keyed by path alone.
    #[must_use]
    pub fn with_caches(mut self, caches: Arc<TemplateCaches<C::Template>>) -> Self {
        self.caches = caches;
        self
    }

    /// Cache set used by this engine.
    #[must_use]
    pub fn caches(&self) -> &Arc<TemplateCaches<C::Template>> {
        &self.caches
    }

    /// Drop every cached file, listing and template.
    pub fn clear_caches(&self) {
        self.caches.clear();
        tracing::debug!("Cleared template caches");
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &ViewsConfig {
        &self.config
    }

    /// Compiler used by this engine.
    #[must_use]
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Path of the view template called `name`.
    ///
    /// Appends the extension if `name` has none. Rooted names are used as-is;
    /// every other name is joined under the views directory.
    #[must_use]
    pub fn resolve_view(&self, name: &str) -> PathBuf {
        let file = if Path::new(name).extension().is_some() {
            name.to_owned()
        } else {
            format!("{name}{}", self.config.extname)
        };

        if Path::new(&file).has_root() {
            PathBuf::from(file)
        } else {
            join_root(&self.config.views_dir, &file)
        }
    }

    /// Effective cache flag for a call.
    pub(crate) fn use_cache(&self, requested: Option<bool>) -> bool {
        requested.unwrap_or(self.config.cache_enabled)
    }

    /// Read a template file.
    ///
    /// Concurrent reads of the same path share one storage read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist and
    /// [`Error::Storage`] for other read failures.
    pub fn read_file(&self, path: impl AsRef<Path>, use_cache: bool) -> Result<Arc<str>, Error> {
        let path = absolute(path.as_ref());
        self.caches.files.get_or_load(path.clone(), use_cache, || {
            tracing::debug!(path = %path.display(), "Reading template file");
            Ok(Arc::from(self.storage.read(&path)?))
        })
    }

    /// List template files below `dir`, relative to it.
    ///
    /// Only names ending with the configured extension are listed. A missing
    /// directory lists as empty. The returned list is a copy; changing it does
    /// not affect the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the directory cannot be scanned.
    pub fn list_directory(
        &self,
        dir: impl AsRef<Path>,
        use_cache: bool,
    ) -> Result<Vec<String>, Error> {
        let dir = absolute(dir.as_ref());
        self.caches.dirs.get_or_load(dir.clone(), use_cache, || {
            let names = self.storage.scan(&dir, &self.config.extname)?;
            tracing::debug!(dir = %dir.display(), count = names.len(), "Listed template directory");
            Ok(names)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use trellis_config::PartialsDir;
    use trellis_storage::MockStorage;

    use super::*;
    use crate::testing::{CountingCompiler, engine, shared, test_config};

    /// Engine over an existing storage with its own caches.
    fn over(storage: &Arc<MockStorage>) -> ViewEngine<CountingCompiler> {
        ViewEngine::new(shared(storage), test_config(), CountingCompiler::new()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ViewsConfig {
            partials_dirs: vec![PartialsDir::namespaced("/app/p", "")],
            ..test_config()
        };

        let err = ViewEngine::handlebars(Arc::new(MockStorage::new()), config).unwrap_err();

        assert!(matches!(err, Error::Configuration(_)), "{err:?}");
    }

    #[test]
    fn test_old_compiler_disables_slash_partials() {
        let storage = Arc::new(MockStorage::new());
        let modern = over(&storage);
        let legacy = ViewEngine::new(
            shared(&storage),
            test_config(),
            CountingCompiler::with_version("1.0.beta.6"),
        )
        .unwrap();

        assert!(modern.slash_partials);
        assert!(!legacy.slash_partials);
    }

    #[test]
    fn test_resolve_view() {
        let (engine, _) = engine(MockStorage::new());

        assert_eq!(engine.resolve_view("home"), PathBuf::from("/app/views/home.hbs"));
        assert_eq!(
            engine.resolve_view("admin/users.hbs"),
            PathBuf::from("/app/views/admin/users.hbs")
        );
        assert_eq!(
            engine.resolve_view("/elsewhere/page"),
            PathBuf::from("/elsewhere/page.hbs")
        );
    }

    #[test]
    fn test_read_file_cached() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "hi"));

        let first = engine.read_file("/app/views/home.hbs", true).unwrap();
        let second = engine.read_file("/app/views/home.hbs", true).unwrap();

        assert_eq!(&*first, "hi");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.read_count("/app/views/home.hbs"), 1);
    }

    #[test]
    fn test_read_file_uncached_rereads() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "v1"));

        engine.read_file("/app/views/home.hbs", false).unwrap();
        storage.insert("/app/views/home.hbs", "v2");
        let second = engine.read_file("/app/views/home.hbs", false).unwrap();

        assert_eq!(&*second, "v2");
        assert_eq!(storage.read_count("/app/views/home.hbs"), 2);
    }

    #[test]
    fn test_read_file_normalizes_path() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "hi"));

        engine.read_file("/app/views/./partials/../home.hbs", true).unwrap();
        engine.read_file("/app/views/home.hbs", true).unwrap();

        assert_eq!(storage.read_count("/app/views/home.hbs"), 1);
    }

    #[test]
    fn test_read_missing_file() {
        let (engine, _) = engine(MockStorage::new());

        let err = engine.read_file("/app/views/missing.hbs", true).unwrap_err();

        assert!(
            matches!(err, Error::NotFound(path) if path == Path::new("/app/views/missing.hbs"))
        );
    }

    #[test]
    fn test_read_failure_is_retried() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "hi"));
        storage.fail_reads("/app/views/home.hbs");

        let err = engine.read_file("/app/views/home.hbs", true).unwrap_err();
        assert!(matches!(err, Error::Storage(_)));

        storage.restore_reads("/app/views/home.hbs");
        let content = engine.read_file("/app/views/home.hbs", true).unwrap();

        assert_eq!(&*content, "hi");
        assert_eq!(storage.read_count("/app/views/home.hbs"), 2);
    }

    #[test]
    fn test_concurrent_reads_share_one_storage_read() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "hi"));
        let engine = Arc::new(engine);
        storage.hold_reads();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.read_file("/app/views/home.hbs", true).unwrap())
            })
            .collect();
        let key = PathBuf::from("/app/views/home.hbs");
        while storage.blocked_reads() == 0 || engine.caches.files.waiters(&key) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        storage.release_reads();

        for reader in readers {
            assert_eq!(&*reader.join().unwrap(), "hi");
        }
        assert_eq!(storage.read_count("/app/views/home.hbs"), 1);
    }

    #[test]
    fn test_list_directory_returns_copy() {
        let (engine, storage) = engine(
            MockStorage::new()
                .with_file("/app/views/partials/nav.hbs", "")
                .with_file("/app/views/partials/forms/input.hbs", "")
                .with_file("/app/views/partials/notes.txt", ""),
        );

        let mut listing = engine.list_directory("/app/views/partials", true).unwrap();
        assert_eq!(listing, vec!["forms/input.hbs", "nav.hbs"]);
        listing.clear();

        let again = engine.list_directory("/app/views/partials", true).unwrap();
        assert_eq!(again, vec!["forms/input.hbs", "nav.hbs"]);
        assert_eq!(storage.scan_count("/app/views/partials"), 1);
    }

    #[test]
    fn test_list_directory_uncached_rescans() {
        let (engine, storage) =
            engine(MockStorage::new().with_file("/app/views/partials/nav.hbs", ""));

        engine.list_directory("/app/views/partials", true).unwrap();
        storage.insert("/app/views/partials/footer.hbs", "");
        let listing = engine.list_directory("/app/views/partials", false).unwrap();

        assert_eq!(listing, vec!["footer.hbs", "nav.hbs"]);
        assert_eq!(storage.scan_count("/app/views/partials"), 2);
    }

    #[test]
    fn test_concurrent_listings_share_one_scan() {
        let (engine, storage) = engine(
            MockStorage::new()
                .with_file("/app/views/partials/nav.hbs", "")
                .with_file("/app/views/partials/footer.hbs", ""),
        );
        let engine = Arc::new(engine);
        storage.hold_scans();

        let listers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || engine.list_directory("/app/views/partials", true).unwrap())
            })
            .collect();
        let key = PathBuf::from("/app/views/partials");
        while storage.blocked_scans() == 0 || engine.caches.dirs.waiters(&key) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        storage.release_scans();

        for lister in listers {
            assert_eq!(lister.join().unwrap(), vec!["footer.hbs", "nav.hbs"]);
        }
        assert_eq!(storage.scan_count("/app/views/partials"), 1);
    }

    #[test]
    fn test_shared_caches() {
        let storage = Arc::new(MockStorage::new().with_file("/app/views/home.hbs", "hi"));
        let first = over(&storage);
        let second = over(&storage).with_caches(Arc::clone(first.caches()));

        first.read_file("/app/views/home.hbs", true).unwrap();
        second.read_file("/app/views/home.hbs", true).unwrap();

        assert_eq!(storage.read_count("/app/views/home.hbs"), 1);
    }

    #[test]
    fn test_instances_isolated_by_default() {
        let storage = Arc::new(MockStorage::new().with_file("/app/views/home.hbs", "hi"));
        let first = over(&storage);
        let second = over(&storage);

        first.read_file("/app/views/home.hbs", true).unwrap();
        second.read_file("/app/views/home.hbs", true).unwrap();

        assert_eq!(storage.read_count("/app/views/home.hbs"), 2);
    }

    #[test]
    fn test_clear_caches() {
        let (engine, storage) = engine(MockStorage::new().with_file("/app/views/home.hbs", "hi"));

        engine.read_file("/app/views/home.hbs", true).unwrap();
        assert_eq!(engine.caches().file_count(), 1);

        engine.clear_caches();
        assert_eq!(engine.caches().file_count(), 0);

        engine.read_file("/app/views/home.hbs", true).unwrap();
        assert_eq!(storage.read_count("/app/views/home.hbs"), 2);
    }
}
