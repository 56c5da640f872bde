//! Compiler version checks for partial naming.
//!
//! Handlebars releases before `1.0.0-rc.2` could not resolve partial names
//! containing `/`, so partials from nested directories are joined with `.`
//! for them. Those releases also reported versions like `1.0.rc.1`, which are
//! not valid semver and get coerced first.

use std::sync::LazyLock;

use regex::Regex;
use semver::{Version, VersionReq};

static SHORT_PRERELEASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d\.\d)\.(\D.*)").expect("invalid version regex"));

/// Minimum version that resolves `/`-separated partial names.
const SLASH_PARTIALS: &str = ">=1.0.0-rc.2";

/// Coerce a short pre-release version into semver.
///
/// `"1.0.rc.2"` becomes `"1.0.0-rc.2"`. Valid versions and strings without
/// that shape are returned unchanged.
#[must_use]
pub fn normalize_version(version: &str) -> String {
    if Version::parse(version).is_ok() {
        return version.to_owned();
    }
    SHORT_PRERELEASE.replace(version, "$1.0-$2").into_owned()
}

/// Whether a compiler reporting `version` resolves partial names with `/`.
///
/// An empty version means an unknown but current compiler. Versions that are
/// still not valid semver after [`normalize_version`] are treated as old.
#[must_use]
pub fn supports_slash_partials(version: &str) -> bool {
    if version.is_empty() {
        return true;
    }
    let Ok(version) = Version::parse(&normalize_version(version)) else {
        return false;
    };
    VersionReq::parse(SLASH_PARTIALS).is_ok_and(|req| req.matches(&version))
}
