//! CLI command implementations.

pub(crate) mod partials;
pub(crate) mod precompile;
pub(crate) mod render;

pub(crate) use partials::PartialsArgs;
pub(crate) use precompile::PrecompileArgs;
pub(crate) use render::RenderArgs;

use std::path::Path;
use std::sync::Arc;

use trellis_config::{CliSettings, Config};
use trellis_engine::ViewEngine;
use trellis_storage::{FsStorage, Storage};

use crate::error::CliError;

/// Load configuration and build a filesystem-backed engine.
fn load_engine(
    config_path: Option<&Path>,
    cli_settings: &CliSettings,
) -> Result<ViewEngine, CliError> {
    let config = Config::load(config_path, Some(cli_settings))?;
    if let Some(path) = &config.config_path {
        tracing::info!(config = %path.display(), "Loaded configuration");
    }

    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new());
    Ok(ViewEngine::handlebars(storage, config.views_resolved)?)
}
