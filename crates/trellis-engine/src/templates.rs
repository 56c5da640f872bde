//! Template compilation with per-path caching.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::compiler::Compiler;
use crate::engine::ViewEngine;
use crate::error::Error;
use crate::layout::absolute;

/// Options for [`ViewEngine::get_template`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateOptions {
    /// Serve from and store into the caches.
    pub cache: bool,
    /// Produce serialized artifacts instead of invokable templates.
    pub precompiled: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            cache: true,
            precompiled: false,
        }
    }
}

impl TemplateOptions {
    /// Set the cache flag.
    #[must_use]
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    /// Request precompiled artifacts.
    #[must_use]
    pub fn precompiled(mut self) -> Self {
        self.precompiled = true;
        self
    }
}

/// Result of compiling one template file.
#[derive(Debug, Clone)]
pub enum Artifact<T> {
    /// Invokable template.
    Compiled(T),
    /// Serialized template for another runtime.
    Precompiled(Arc<str>),
}

impl<T> Artifact<T> {
    /// The invokable template, if this is one.
    pub fn into_compiled(self) -> Option<T> {
        match self {
            Self::Compiled(template) => Some(template),
            Self::Precompiled(_) => None,
        }
    }

    /// The serialized template, if this is one.
    pub fn into_precompiled(self) -> Option<Arc<str>> {
        match self {
            Self::Compiled(_) => None,
            Self::Precompiled(source) => Some(source),
        }
    }
}

impl<C: Compiler> ViewEngine<C> {
    /// Compile the template at `path`.
    ///
    /// With `options.cache`, a cached artifact is returned without touching
    /// storage. Otherwise the file is read (through the file cache, honoring
    /// the same flag) and compiled, and the result replaces the cached one.
    /// Compiled and precompiled artifacts are cached separately.
    ///
    /// # Errors
    ///
    /// Returns the read error, or [`Error::Compile`] if the source does not
    /// compile. Failures are never cached.
    pub fn get_template(
        &self,
        path: impl AsRef<Path>,
        options: TemplateOptions,
    ) -> Result<Artifact<C::Template>, Error> {
        if options.precompiled {
            self.precompiled_template(path.as_ref(), options.cache)
                .map(Artifact::Precompiled)
        } else {
            self.compiled_template(path.as_ref(), options.cache)
                .map(Artifact::Compiled)
        }
    }

    /// Compile every template below `dir`.
    ///
    /// Keys are the paths relative to `dir` as listed by
    /// [`list_directory`](Self::list_directory). Files are compiled in
    /// parallel.
    ///
    /// # Errors
    ///
    /// Fails if the listing fails or if any single file fails.
    pub fn get_templates(
        &self,
        dir: impl AsRef<Path>,
        options: TemplateOptions,
    ) -> Result<BTreeMap<String, Artifact<C::Template>>, Error> {
        self.templates_in(dir.as_ref(), options.cache, |path| {
            self.get_template(path, options)
        })
    }

    pub(crate) fn compiled_template(&self, path: &Path, cache: bool) -> Result<C::Template, Error> {
        let path = absolute(path);
        self.caches.compiled.get_or_load(path.clone(), cache, || {
            let source = self.read_file(&path, cache)?;
            tracing::debug!(path = %path.display(), "Compiling template");
            self.compiler
                .compile(&source)
                .map_err(|e| Error::compile(&path, e.0))
        })
    }

    pub(crate) fn precompiled_template(&self, path: &Path, cache: bool) -> Result<Arc<str>, Error> {
        let path = absolute(path);
        self.caches.precompiled.get_or_load(path.clone(), cache, || {
            let source = self.read_file(&path, cache)?;
            tracing::debug!(path = %path.display(), "Precompiling template");
            self.compiler
                .precompile(&source)
                .map(Arc::from)
                .map_err(|e| Error::compile(&path, e.0))
        })
    }

    /// List `dir` and run `load` on every listed file in parallel.
    pub(crate) fn templates_in<A, F>(
        &self,
        dir: &Path,
        cache: bool,
        load: F,
    ) -> Result<BTreeMap<String, A>, Error>
    where
        A: Send,
        F: Fn(&Path) -> Result<A, Error> + Sync,
    {
        let dir = absolute(dir);
        let names = self.list_directory(&dir, cache)?;

        names
            .par_iter()
            .map(|name| load(&dir.join(name)).map(|artifact| (name.clone(), artifact)))
            .collect()
    }
}
