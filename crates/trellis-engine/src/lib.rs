//! Template view engine for Trellis.
//!
//! Locates template files, compiles them once per cache generation,
//! assembles partials from one or more (optionally namespaced) directories and
//! renders views through an optional layout.
//!
//! # Pipeline
//!
//! 1. The view template and the partials are resolved in parallel
//! 2. The view is rendered with the context, merged helpers and partials
//! 3. If a layout applies, it is rendered with the context plus `body`
//!
//! Raw files, directory listings, compiled and precompiled templates each
//! have their own cache. Concurrent requests for the same path share a single
//! storage read and a single compile; failures are never cached.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use trellis_config::ViewsConfig;
//! use trellis_engine::{RenderOptions, ViewEngine};
//! use trellis_storage::FsStorage;
//!
//! let engine = Arc::new(ViewEngine::handlebars(
//!     Arc::new(FsStorage::new()),
//!     ViewsConfig::default(),
//! )?);
//!
//! let view = engine.resolve_view("home");
//! engine.render_view(view, RenderOptions::new().with_layout("main"), |result| {
//!     match result {
//!         Ok(html) => tracing::info!(bytes = html.len(), "Rendered"),
//!         Err(err) => tracing::error!(%err, "Render failed"),
//!     }
//! });
//! # Ok::<(), trellis_engine::Error>(())
//! ```

mod caches;
mod compiler;
mod engine;
mod error;
mod handlebars;
mod layout;
mod partials;
mod render;
mod templates;
#[cfg(test)]
mod testing;
mod version;

pub use caches::TemplateCaches;
pub use compiler::{Compiler, CompilerError, HelperMap, Invocation, PartialMap};
pub use engine::ViewEngine;
pub use error::Error;
pub use crate::handlebars::{HANDLEBARS_VERSION, HandlebarsCompiler, HelperRef, helper_fn};
pub use layout::{LayoutSelection, join_root, resolve_layout_path};
pub use render::RenderOptions;
pub use templates::{Artifact, TemplateOptions};
pub use version::{normalize_version, supports_slash_partials};

pub use trellis_config::{PartialsDir, ViewsConfig};
