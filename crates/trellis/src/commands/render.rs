//! `trellis render` command implementation.

use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use clap::Args;
use serde_json::{Map, Value};
use trellis_config::CliSettings;
use trellis_engine::RenderOptions;

use super::load_engine;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// View name (relative to the views directory) or path.
    view: String,

    /// Render context as a JSON object.
    #[arg(long)]
    context: Option<String>,

    /// Layout name (overrides the configured default layout).
    #[arg(short, long)]
    layout: Option<String>,

    /// Render without any layout.
    #[arg(long, conflicts_with = "layout")]
    no_layout: bool,

    /// Disable caching.
    #[arg(long)]
    no_cache: bool,

    /// Path to configuration file (default: auto-discover trellis.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl RenderArgs {
    pub(crate) fn execute(self, output: &Output) -> Result<(), CliError> {
        let html = self.render()?;
        output.emit(&html)?;
        Ok(())
    }

    fn render(self) -> Result<String, CliError> {
        let cli_settings = CliSettings {
            cache_enabled: self.no_cache.then_some(false),
            ..CliSettings::default()
        };
        let engine = Arc::new(load_engine(self.config.as_deref(), &cli_settings)?);

        let mut options: RenderOptions = RenderOptions::new();
        if let Some(context) = &self.context {
            options = options.with_context(parse_context(context)?);
        }
        if self.no_layout {
            options = options.without_layout();
        } else if let Some(layout) = self.layout {
            options = options.with_layout(layout);
        }

        let view = engine.resolve_view(&self.view);
        tracing::info!(view = %view.display(), "Rendering view");

        let (tx, rx) = mpsc::channel();
        engine.render_view(view, options, move |result| {
            let _ = tx.send(result);
        });
        let html = rx
            .recv()
            .map_err(|_| CliError::Validation("Render finished without a result".to_owned()))??;
        Ok(html)
    }
}

/// Parse `--context` into a JSON object.
fn parse_context(raw: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation(format!(
            "--context must be a JSON object, got: {other}"
        ))),
    }
}
