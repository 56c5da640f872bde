//! `trellis partials` command implementation.

use std::path::PathBuf;

use clap::Args;
use trellis_config::CliSettings;
use trellis_engine::TemplateOptions;

use super::load_engine;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the partials command.
#[derive(Args)]
pub(crate) struct PartialsArgs {
    /// Path to configuration file (default: auto-discover trellis.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl PartialsArgs {
    pub(crate) fn execute(self, output: &Output) -> Result<(), CliError> {
        let names = self.names()?;
        if names.is_empty() {
            output.info("No partials found");
        }
        for name in &names {
            output.emit(name)?;
        }
        Ok(())
    }

    /// Partial names in sorted order.
    fn names(&self) -> Result<Vec<String>, CliError> {
        let engine = load_engine(self.config.as_deref(), &CliSettings::default())?;
        let partials = engine.get_partials(TemplateOptions::default())?;
        Ok(partials.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::commands::fixtures::project;

    #[test]
    fn test_lists_nested_partials() {
        let (_dir, config) = project();
        let args = PartialsArgs {
            config: Some(config),
        };

        assert_eq!(args.names().unwrap(), vec!["forms/input", "title"]);
    }

    #[test]
    fn test_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let args = PartialsArgs {
            config: Some(dir.path().join("nope.toml")),
        };

        assert!(matches!(args.names(), Err(CliError::Config(_))));
    }
}
