//! `trellis precompile` command implementation.

use std::path::PathBuf;

use clap::Args;
use serde_json::{Map, Value};
use trellis_config::CliSettings;
use trellis_engine::{Artifact, TemplateOptions};

use super::load_engine;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the precompile command.
#[derive(Args)]
pub(crate) struct PrecompileArgs {
    /// Directory of templates to precompile.
    dir: PathBuf,

    /// Path to configuration file (default: auto-discover trellis.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl PrecompileArgs {
    pub(crate) fn execute(self, output: &Output) -> Result<(), CliError> {
        let templates = self.precompile()?;
        let count = templates.len();
        output.emit(&serde_json::to_string_pretty(&Value::Object(templates))?)?;
        output.success(&format!("Precompiled {count} templates"));
        Ok(())
    }

    /// Template name (extension stripped) to precompiled artifact.
    fn precompile(&self) -> Result<Map<String, Value>, CliError> {
        let engine = load_engine(self.config.as_deref(), &CliSettings::default())?;
        let extname = engine.config().extname.clone();
        let artifacts = engine.get_templates(&self.dir, TemplateOptions::default().precompiled())?;

        let mut templates = Map::new();
        for (relative, artifact) in artifacts {
            let Artifact::Precompiled(source) = artifact else {
                continue;
            };
            let name = relative.strip_suffix(extname.as_str()).unwrap_or(&relative);
            templates.insert(name.to_owned(), serde_json::from_str(&source)?);
        }
        Ok(templates)
    }
}
