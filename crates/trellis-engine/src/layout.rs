//! Layout and view path resolution.

use std::path::{Component, Path, PathBuf};

/// Which layout wraps a rendered view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayoutSelection {
    /// Use the engine's configured default layout, if any.
    #[default]
    Default,
    /// Render the view without a layout, even if a default is configured.
    None,
    /// Use the named layout.
    Named(String),
}

impl LayoutSelection {
    /// Effective layout name given the engine default.
    pub(crate) fn name<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        match self {
            Self::Default => default,
            Self::None => None,
            Self::Named(name) => Some(name),
        }
    }
}

impl From<Option<String>> for LayoutSelection {
    fn from(name: Option<String>) -> Self {
        name.map_or(Self::None, Self::Named)
    }
}

/// Turn a layout name into the layout template path.
///
/// Returns `None` for an empty name. A name without an extension gets
/// `extname` appended. Rooted names are used as-is; every other name is joined
/// under `layouts_dir`.
pub fn resolve_layout_path(name: &str, extname: &str, layouts_dir: &Path) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let file = if Path::new(name).extension().is_some() {
        name.to_owned()
    } else {
        format!("{name}{extname}")
    };

    let path = Path::new(&file);
    if path.has_root() {
        Some(path.to_path_buf())
    } else {
        Some(layouts_dir.join(path))
    }
}

/// Join `name` under `root` with exactly one separator between them.
///
/// Leading separators on `name` are dropped so the result always stays under
/// `root`.
pub fn join_root(root: &Path, name: &str) -> PathBuf {
    root.join(name.trim_start_matches('/'))
}

/// Absolute, lexically normalized form of `path`.
///
/// Relative paths are resolved against the current working directory. `.`
/// components are dropped and `..` pops the previous component; symlinks are
/// not followed.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
