//! Render pipeline: view pass, optional layout pass, callback delivery.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::compiler::{Compiler, HelperMap, Invocation, PartialMap};
use crate::engine::ViewEngine;
use crate::error::Error;
use crate::handlebars::HandlebarsCompiler;
use crate::layout::{LayoutSelection, absolute, resolve_layout_path};

/// Context key holding the rendered view inside a layout.
const BODY_KEY: &str = "body";

/// Per-render options.
pub struct RenderOptions<C: Compiler = HandlebarsCompiler> {
    /// Variables passed to the view and its layout.
    pub context: Map<String, Value>,
    /// Layout wrapping the view (only used by [`ViewEngine::render_view`]).
    ///
    /// The selection is not exposed to templates: `{{layout}}` renders empty
    /// unless the context sets it.
    pub layout: LayoutSelection,
    /// Cache flag; the engine default applies when unset.
    pub cache: Option<bool>,
    /// Private data handed to the compiler alongside the context.
    pub data: Option<Value>,
    /// Helpers overriding compiler and engine helpers for this render.
    pub helpers: HelperMap<C::Helper>,
    /// Partials to use instead of collecting them from the partial
    /// directories.
    pub partials: Option<PartialMap<C::Template>>,
}

impl<C: Compiler> Default for RenderOptions<C> {
    fn default() -> Self {
        Self {
            context: Map::new(),
            layout: LayoutSelection::Default,
            cache: None,
            data: None,
            helpers: HelperMap::new(),
            partials: None,
        }
    }
}

impl<C: Compiler> Clone for RenderOptions<C> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            layout: self.layout.clone(),
            cache: self.cache,
            data: self.data.clone(),
            helpers: self.helpers.clone(),
            partials: self.partials.clone(),
        }
    }
}

impl<C: Compiler> fmt::Debug for RenderOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut helpers: Vec<&String> = self.helpers.keys().collect();
        helpers.sort();
        f.debug_struct("RenderOptions")
            .field("context", &self.context)
            .field("layout", &self.layout)
            .field("cache", &self.cache)
            .field("data", &self.data)
            .field("helpers", &helpers)
            .field("partials", &self.partials.as_ref().map(|p| p.keys().collect::<Vec<_>>()))
            .finish()
    }
}

impl<C: Compiler> RenderOptions<C> {
    /// Options with an empty context and the default layout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `context` as the render variables.
    #[must_use]
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Set one render variable.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Wrap the view in the named layout.
    #[must_use]
    pub fn with_layout(mut self, name: impl Into<String>) -> Self {
        self.layout = LayoutSelection::Named(name.into());
        self
    }

    /// Render the view without any layout.
    #[must_use]
    pub fn without_layout(mut self) -> Self {
        self.layout = LayoutSelection::None;
        self
    }

    /// Override the cache flag for this render.
    #[must_use]
    pub fn with_cache(mut self, cache: bool) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach private data.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add a helper for this render only.
    #[must_use]
    pub fn with_helper(mut self, name: impl Into<String>, helper: C::Helper) -> Self {
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Use `partials` verbatim instead of collecting them.
    #[must_use]
    pub fn with_partials(mut self, partials: PartialMap<C::Template>) -> Self {
        self.partials = Some(partials);
        self
    }
}

impl<C: Compiler> ViewEngine<C> {
    /// Render the template at `path` with `context`.
    ///
    /// The compiled template and the partials are resolved in parallel;
    /// partials supplied in `options` are used as-is. Helpers are merged from
    /// the compiler, the engine and `options`, later sources winning. Layouts
    /// are not applied.
    ///
    /// # Errors
    ///
    /// Returns the first failure of template resolution, partial collection
    /// or rendering.
    pub fn render(
        &self,
        path: impl AsRef<Path>,
        context: &Value,
        options: &RenderOptions<C>,
    ) -> Result<String, Error> {
        let path = absolute(path.as_ref());
        let cache = self.use_cache(options.cache);

        let (template, partials) = rayon::join(
            || self.compiled_template(&path, cache),
            || match &options.partials {
                Some(supplied) => Ok(Cow::Borrowed(supplied)),
                None => self.compiled_partials(cache).map(Cow::Owned),
            },
        );
        let template = template?;
        let partials = partials?;
        let helpers = self.merged_helpers(&options.helpers);

        tracing::debug!(path = %path.display(), partials = partials.len(), "Rendering template");
        self.compiler
            .render(
                &template,
                context,
                &Invocation {
                    data: options.data.as_ref(),
                    helpers: &helpers,
                    partials: &partials,
                },
            )
            .map_err(|e| Error::render(&path, e.0))
    }

    /// Render a view and wrap it in its layout, blocking the caller.
    ///
    /// The layout is `options.layout`, falling back to the configured default
    /// layout. When one resolves, the view output is rendered again through
    /// the layout with the context extended by a `body` key.
    ///
    /// # Errors
    ///
    /// Fails if either pass fails; no partial output is returned.
    pub fn render_view_blocking(
        &self,
        path: impl AsRef<Path>,
        options: &RenderOptions<C>,
    ) -> Result<String, Error> {
        let layout = options
            .layout
            .name(self.config.default_layout.as_deref())
            .and_then(|name| {
                resolve_layout_path(name, &self.config.extname, &self.config.layouts_dir)
            });

        let mut context = Value::Object(options.context.clone());
        let body = self.render(path, &context, options)?;

        let Some(layout) = layout else {
            return Ok(body);
        };

        tracing::debug!(layout = %layout.display(), "Rendering layout");
        if let Value::Object(map) = &mut context {
            map.insert(BODY_KEY.to_owned(), Value::String(body));
        }
        self.render(&layout, &context, options)
    }

    /// Render a view with its layout and deliver the result to `callback`.
    ///
    /// The work runs on the rayon thread pool and `callback` is always invoked
    /// from there, never from within this call, even when everything is
    /// cached.
    pub fn render_view<F>(
        self: &Arc<Self>,
        path: impl Into<PathBuf>,
        options: RenderOptions<C>,
        callback: F,
    ) where
        F: FnOnce(Result<String, Error>) + Send + 'static,
    {
        let engine = Arc::clone(self);
        let path = path.into();
        rayon::spawn(move || {
            let result = engine.render_view_blocking(&path, &options);
            if let Err(err) = &result {
                tracing::warn!(path = %path.display(), error = %err, "View render failed");
            }
            callback(result);
        });
    }

    fn merged_helpers(&self, overrides: &HelperMap<C::Helper>) -> HelperMap<C::Helper> {
        let mut helpers = self.compiler.helpers();
        helpers.extend(self.helpers.iter().map(|(k, v)| (k.clone(), v.clone())));
        helpers.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        helpers
    }
}
