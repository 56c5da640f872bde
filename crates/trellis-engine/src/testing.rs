//! Test fixtures shared by the engine modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use handlebars::Template;
use serde_json::Value;
use trellis_config::{PartialsDir, ViewsConfig};
use trellis_storage::{MockStorage, Storage};

use crate::compiler::{Compiler, CompilerError, HelperMap, Invocation};
use crate::engine::ViewEngine;
use crate::handlebars::{HANDLEBARS_VERSION, HandlebarsCompiler, HelperRef};

/// Handlebars compiler that counts compile calls and reports any version.
pub(crate) struct CountingCompiler {
    inner: HandlebarsCompiler,
    version: String,
    compiles: AtomicUsize,
    precompiles: AtomicUsize,
}

impl CountingCompiler {
    pub(crate) fn new() -> Self {
        Self::with_version(HANDLEBARS_VERSION)
    }

    pub(crate) fn with_version(version: &str) -> Self {
        Self {
            inner: HandlebarsCompiler::new(),
            version: version.to_owned(),
            compiles: AtomicUsize::new(0),
            precompiles: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_helper(mut self, name: &str, helper: HelperRef) -> Self {
        self.inner = self.inner.with_helper(name, helper);
        self
    }

    pub(crate) fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub(crate) fn precompiles(&self) -> usize {
        self.precompiles.load(Ordering::SeqCst)
    }
}

impl Compiler for CountingCompiler {
    type Template = Arc<Template>;
    type Helper = HelperRef;

    fn version(&self) -> &str {
        &self.version
    }

    fn compile(&self, source: &str) -> Result<Self::Template, CompilerError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(source)
    }

    fn precompile(&self, source: &str) -> Result<String, CompilerError> {
        self.precompiles.fetch_add(1, Ordering::SeqCst);
        self.inner.precompile(source)
    }

    fn helpers(&self) -> HelperMap<HelperRef> {
        self.inner.helpers()
    }

    fn render(
        &self,
        template: &Self::Template,
        context: &Value,
        invocation: &Invocation<'_, Self::Template, Self::Helper>,
    ) -> Result<String, CompilerError> {
        self.inner.render(template, context, invocation)
    }
}

/// Views rooted at `/app/views` with `.hbs` templates.
pub(crate) fn test_config() -> ViewsConfig {
    ViewsConfig {
        views_dir: "/app/views".into(),
        extname: ".hbs".to_owned(),
        layouts_dir: "/app/views/layouts/".into(),
        partials_dirs: vec![PartialsDir::new("/app/views/partials")],
        default_layout: None,
        cache_enabled: true,
    }
}

/// Mock storage as a storage trait object.
pub(crate) fn shared(storage: &Arc<MockStorage>) -> Arc<dyn Storage> {
    let storage: Arc<MockStorage> = Arc::clone(storage);
    storage
}

/// Engine over `storage` with [`test_config`].
pub(crate) fn engine(storage: MockStorage) -> (ViewEngine<CountingCompiler>, Arc<MockStorage>) {
    engine_with(storage, test_config(), CountingCompiler::new())
}

/// Engine over `storage` with a custom config and compiler.
pub(crate) fn engine_with(
    storage: MockStorage,
    config: ViewsConfig,
    compiler: CountingCompiler,
) -> (ViewEngine<CountingCompiler>, Arc<MockStorage>) {
    let storage = Arc::new(storage);
    let engine = ViewEngine::new(shared(&storage), config, compiler).unwrap();
    (engine, storage)
}
