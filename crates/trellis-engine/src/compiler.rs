//! Template compiler capability.
//!
//! The view engine never evaluates template syntax itself. It hands raw source
//! to a [`Compiler`] and later asks the same compiler to invoke the compiled
//! artifact with a context and an [`Invocation`] bundle.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// Helpers by name.
pub type HelperMap<H> = HashMap<String, H>;

/// Compiled partials by partial name.
pub type PartialMap<T> = BTreeMap<String, T>;

/// Error reported by a [`Compiler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct CompilerError(pub String);

impl CompilerError {
    /// Create a compiler error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Everything a template needs at invocation time besides its context.
#[derive(Debug)]
pub struct Invocation<'a, T, H> {
    /// Caller-supplied private data.
    pub data: Option<&'a Value>,
    /// Merged helpers (compiler built-ins, engine overrides, call overrides).
    pub helpers: &'a HelperMap<H>,
    /// Partials available to the template.
    pub partials: &'a PartialMap<T>,
}

/// Compiles template source and invokes compiled templates.
pub trait Compiler: Send + Sync + 'static {
    /// Invokable compiled template.
    type Template: Clone + Send + Sync + 'static;
    /// Helper function handle.
    type Helper: Clone + Send + Sync + 'static;

    /// Version of the underlying template language implementation.
    ///
    /// Only used to decide how partial names are joined.
    fn version(&self) -> &str;

    /// Compile source into an invokable template.
    fn compile(&self, source: &str) -> Result<Self::Template, CompilerError>;

    /// Compile source into a serialized form meant for another runtime.
    fn precompile(&self, source: &str) -> Result<String, CompilerError>;

    /// Helpers the compiler provides on its own.
    fn helpers(&self) -> HelperMap<Self::Helper>;

    /// Render `template` with `context`.
    fn render(
        &self,
        template: &Self::Template,
        context: &Value,
        invocation: &Invocation<'_, Self::Template, Self::Helper>,
    ) -> Result<String, CompilerError>;
}
