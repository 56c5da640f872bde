//! Handlebars compiler backed by the `handlebars` crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, ScopedJson, Template,
};
use serde_json::{Value, json};

use crate::compiler::{Compiler, CompilerError, HelperMap, Invocation};

/// Version reported by [`HandlebarsCompiler`].
pub const HANDLEBARS_VERSION: &str = "6.0.0";

/// Registry name of the template being rendered.
const VIEW_TEMPLATE: &str = "__trellis_view__";

/// Name of the helper exposing invocation data.
const DATA_HELPER: &str = "data";

/// Shared handle to a Handlebars helper.
pub type HelperRef = Arc<dyn HelperDef + Send + Sync>;

/// Wrap a closure over helper parameters as a Handlebars helper.
///
/// The closure receives the resolved parameter values and returns the value to
/// output, or an error message that aborts the render.
///
/// ```
/// use serde_json::Value;
/// use trellis_engine::helper_fn;
///
/// let shout = helper_fn(|params| {
///     let text = params.first().and_then(Value::as_str).unwrap_or_default();
///     Ok(Value::String(text.to_uppercase()))
/// });
/// # drop(shout);
/// ```
pub fn helper_fn<F>(f: F) -> HelperRef
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(FnHelper(f))
}

struct FnHelper<F>(F);

impl<F> HelperDef for FnHelper<F>
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync,
{
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let params: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        (self.0)(&params)
            .map(ScopedJson::Derived)
            .map_err(|message| RenderErrorReason::Other(message).into())
    }
}

/// Registers an [`Arc`]-shared helper into a per-render registry.
struct SharedHelper(HelperRef);

impl HelperDef for SharedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.0.call_inner(h, r, ctx, rc)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        self.0.call(h, r, ctx, rc, out)
    }
}

/// `{{data "user.name"}}`: dotted lookup into invocation data.
struct DataHelper(Value);

impl DataHelper {
    fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.0);
        }
        self.0.pointer(&format!("/{}", path.replace('.', "/")))
    }
}

impl HelperDef for DataHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let path = h.param(0).and_then(|p| p.value().as_str()).unwrap_or_default();
        let value = self.lookup(path).cloned().unwrap_or(Value::Null);
        Ok(ScopedJson::Derived(value))
    }
}

/// [`Compiler`] implementation for Handlebars templates.
///
/// Every render builds a fresh registry holding the invocation's partials and
/// helpers, so compiled templates can be shared freely between renders.
/// Registering copies the parsed view and every partial into that registry;
/// render cost therefore grows with the size of the partial set even though
/// parsing happens once per cache generation.
///
/// The `data` helper exposes invocation data (`{{data "user.name"}}`). It
/// renders empty when no data is supplied, and any helper registered under
/// the same name takes precedence.
#[derive(Clone, Default)]
pub struct HandlebarsCompiler {
    helpers: HelperMap<HelperRef>,
    strict: bool,
}

impl fmt::Debug for HandlebarsCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut helpers: Vec<&String> = self.helpers.keys().collect();
        helpers.sort();
        f.debug_struct("HandlebarsCompiler")
            .field("helpers", &helpers)
            .field("strict", &self.strict)
            .finish()
    }
}

impl HandlebarsCompiler {
    /// Create a compiler without extra helpers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper available to every template this compiler renders.
    #[must_use]
    pub fn with_helper(mut self, name: impl Into<String>, helper: HelperRef) -> Self {
        self.helpers.insert(name.into(), helper);
        self
    }

    /// Fail renders that reference missing fields.
    #[must_use]
    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl Compiler for HandlebarsCompiler {
    type Template = Arc<Template>;
    type Helper = HelperRef;

    fn version(&self) -> &str {
        HANDLEBARS_VERSION
    }

    fn compile(&self, source: &str) -> Result<Self::Template, CompilerError> {
        Template::compile(source)
            .map(Arc::new)
            .map_err(|e| CompilerError::new(e.to_string()))
    }

    fn precompile(&self, source: &str) -> Result<String, CompilerError> {
        self.compile(source)?;
        Ok(json!({
            "compiler": "handlebars",
            "version": HANDLEBARS_VERSION,
            "source": source,
        })
        .to_string())
    }

    fn helpers(&self) -> HashMap<String, HelperRef> {
        self.helpers.clone()
    }

    fn render(
        &self,
        template: &Self::Template,
        context: &Value,
        invocation: &Invocation<'_, Self::Template, Self::Helper>,
    ) -> Result<String, CompilerError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(self.strict);

        let data = invocation.data.cloned().unwrap_or(Value::Null);
        registry.register_helper(DATA_HELPER, Box::new(DataHelper(data)));
        for (name, helper) in invocation.helpers {
            registry.register_helper(name, Box::new(SharedHelper(Arc::clone(helper))));
        }
        for (name, partial) in invocation.partials {
            registry.register_template(name, Template::clone(partial));
        }
        registry.register_template(VIEW_TEMPLATE, Template::clone(template));

        registry
            .render(VIEW_TEMPLATE, context)
            .map_err(|e| CompilerError::new(e.to_string()))
    }
}
