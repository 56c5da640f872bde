//! Configuration management for Trellis.
//!
//! Parses `trellis.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `views.dir`
//! - `views.layouts_dir`
//! - `views.default_layout`
//! - `views.partials_dir` (every directory)

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override template extension.
    pub extname: Option<String>,
    /// Override default layout name.
    pub default_layout: Option<String>,
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override views directory.
    pub views_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "trellis.toml";

const DEFAULT_VIEWS_DIR: &str = "views";
const DEFAULT_EXTNAME: &str = ".handlebars";
const DEFAULT_LAYOUTS_DIR: &str = "views/layouts/";
const DEFAULT_PARTIALS_DIR: &str = "views/partials/";

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// View configuration (paths are relative strings from TOML).
    views: ViewsConfigRaw,

    /// Resolved view configuration (set after loading).
    #[serde(skip)]
    pub views_resolved: ViewsConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Raw view configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ViewsConfigRaw {
    dir: Option<String>,
    extname: Option<String>,
    layouts_dir: Option<String>,
    default_layout: Option<String>,
    cache: Option<bool>,
    partials_dir: Option<PartialsDirSetting>,
}

/// `partials_dir` accepts one entry or a list of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PartialsDirSetting {
    One(PartialsDirEntry),
    Many(Vec<PartialsDirEntry>),
}

impl PartialsDirSetting {
    fn into_entries(self) -> Vec<PartialsDirEntry> {
        match self {
            Self::One(entry) => vec![entry],
            Self::Many(entries) => entries,
        }
    }
}

/// A bare directory or a `{ dir, namespace }` table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PartialsDirEntry {
    Path(String),
    Table {
        dir: String,
        namespace: Option<String>,
    },
}

/// A directory of partial templates, optionally namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialsDir {
    /// Directory scanned for partials.
    pub dir: PathBuf,
    /// Prefix applied to every partial name found in `dir`.
    pub namespace: Option<String>,
}

impl PartialsDir {
    /// Partials directory without a namespace.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            namespace: None,
        }
    }

    /// Partials directory whose partial names get a `namespace/` prefix.
    #[must_use]
    pub fn namespaced(dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            namespace: Some(namespace.into()),
        }
    }
}

/// Resolved view configuration.
///
/// Paths are absolute when loaded from a config file and relative to the
/// working directory otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewsConfig {
    /// Root for bare view names.
    pub views_dir: PathBuf,
    /// Template file extension, always starting with `.`.
    pub extname: String,
    /// Directory holding layout templates.
    pub layouts_dir: PathBuf,
    /// Partial directories in precedence order (later wins).
    pub partials_dirs: Vec<PartialsDir>,
    /// Layout applied when a render does not choose one.
    pub default_layout: Option<String>,
    /// Default per-call cache flag.
    pub cache_enabled: bool,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            views_dir: PathBuf::from(DEFAULT_VIEWS_DIR),
            extname: DEFAULT_EXTNAME.to_owned(),
            layouts_dir: PathBuf::from(DEFAULT_LAYOUTS_DIR),
            partials_dirs: vec![PartialsDir::new(DEFAULT_PARTIALS_DIR)],
            default_layout: None,
            cache_enabled: true,
        }
    }
}

impl ViewsConfig {
    /// Validate view configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extname.len() <= 1 || !self.extname.starts_with('.') {
            return Err(ConfigError::Validation(
                "views.extname cannot be empty".to_owned(),
            ));
        }

        if let Some(layout) = &self.default_layout {
            require_non_empty(layout, "views.default_layout")?;
        }

        for partials in &self.partials_dirs {
            if let Some(namespace) = &partials.namespace {
                require_non_empty(namespace, "views.partials_dir.namespace")?;
                if namespace.starts_with('/') || namespace.ends_with('/') {
                    return Err(ConfigError::Validation(format!(
                        "views.partials_dir.namespace cannot start or end with '/': {namespace}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Prefix an extension with `.` unless it already has one.
#[must_use]
pub fn normalize_extname(extname: &str) -> String {
    if extname.starts_with('.') {
        extname.to_owned()
    } else {
        format!(".{extname}")
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`views.dir`").
        field: String,
        /// Error message (e.g., "${`VIEWS_DIR`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `trellis.toml` in current directory and parents.
    /// Without any file the defaults apply.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        let views = &mut self.views_resolved;
        if let Some(extname) = &settings.extname {
            views.extname = normalize_extname(extname);
        }
        if let Some(layout) = &settings.default_layout {
            views.default_layout = Some(layout.clone());
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            views.cache_enabled = cache_enabled;
        }
        if let Some(views_dir) = &settings.views_dir {
            views.views_dir.clone_from(views_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.views_resolved.validate()
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        let views = &mut self.views;

        if let Some(dir) = &views.dir {
            views.dir = Some(expand::expand_env(dir, "views.dir")?);
        }
        if let Some(dir) = &views.layouts_dir {
            views.layouts_dir = Some(expand::expand_env(dir, "views.layouts_dir")?);
        }
        if let Some(layout) = &views.default_layout {
            views.default_layout = Some(expand::expand_env(layout, "views.default_layout")?);
        }
        if let Some(setting) = views.partials_dir.take() {
            let entries = setting
                .into_entries()
                .into_iter()
                .map(|entry| match entry {
                    PartialsDirEntry::Path(dir) => {
                        expand::expand_env(&dir, "views.partials_dir").map(PartialsDirEntry::Path)
                    }
                    PartialsDirEntry::Table { dir, namespace } => {
                        expand::expand_env(&dir, "views.partials_dir.dir")
                            .map(|dir| PartialsDirEntry::Table { dir, namespace })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            views.partials_dir = Some(PartialsDirSetting::Many(entries));
        }

        Ok(())
    }

    /// Resolve relative paths against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        let partials_dirs = match self.views.partials_dir.take() {
            Some(setting) => setting
                .into_entries()
                .into_iter()
                .map(|entry| match entry {
                    PartialsDirEntry::Path(dir) => PartialsDir::new(config_dir.join(dir)),
                    PartialsDirEntry::Table { dir, namespace } => PartialsDir {
                        dir: config_dir.join(dir),
                        namespace,
                    },
                })
                .collect(),
            None => vec![PartialsDir::new(config_dir.join(DEFAULT_PARTIALS_DIR))],
        };

        self.views_resolved = ViewsConfig {
            views_dir: resolve(self.views.dir.as_deref(), DEFAULT_VIEWS_DIR),
            extname: normalize_extname(self.views.extname.as_deref().unwrap_or(DEFAULT_EXTNAME)),
            layouts_dir: resolve(self.views.layouts_dir.as_deref(), DEFAULT_LAYOUTS_DIR),
            partials_dirs,
            default_layout: self.views.default_layout.clone(),
            cache_enabled: self.views.cache.unwrap_or(true),
        };
    }
}
