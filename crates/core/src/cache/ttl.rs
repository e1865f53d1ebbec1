//! TTL policy for cached documentation.
//!
//! Maps release maturity (version label + branch) to a cache lifetime:
//! content tracking ongoing development goes stale quickly, stable releases
//! can be held for a day.

use std::collections::BTreeMap;

use serde::Serialize;

/// Branch names that track ongoing development rather than a tagged release.
const HEAD_BRANCHES: &[&str] = &["dev", "develop", "development", "master", "main"];

/// Cache lifetime class for a piece of documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    /// Development snapshots: 1 hour.
    Dev,
    /// Beta and release-candidate versions: 6 hours.
    Beta,
    /// Stable releases: 24 hours.
    Stable,
    /// Everything else: 3 hours.
    Default,
}

impl TtlClass {
    /// Lifetime in seconds.
    pub fn seconds(self) -> i64 {
        match self {
            TtlClass::Dev => 60 * 60,
            TtlClass::Beta => 6 * 60 * 60,
            TtlClass::Stable => 24 * 60 * 60,
            TtlClass::Default => 3 * 60 * 60,
        }
    }
}

/// Classify a `(version, branch)` pair into a lifetime class.
///
/// Rules are evaluated in order, first match wins. Matching is
/// case-insensitive substring matching and total: input that matches no rule
/// falls through to [`TtlClass::Default`].
pub fn classify(version: &str, branch: &str) -> TtlClass {
    let version = version.to_lowercase();
    let branch = branch.to_lowercase();

    if HEAD_BRANCHES.contains(&branch.as_str()) && (version.contains("dev") || version.contains("alpha")) {
        return TtlClass::Dev;
    }

    if version.contains("beta") || version.contains("rc") {
        return TtlClass::Beta;
    }

    if version.contains("stable") || version == "latest" {
        return TtlClass::Stable;
    }

    TtlClass::Default
}

/// The full class-to-seconds table, as surfaced by cache statistics.
pub fn table() -> BTreeMap<&'static str, i64> {
    BTreeMap::from([
        ("dev", TtlClass::Dev.seconds()),
        ("beta", TtlClass::Beta.seconds()),
        ("stable", TtlClass::Stable.seconds()),
        ("default", TtlClass::Default.seconds()),
    ])
}
