//! Package identification - WHAT package (id + version).
//!
//! NuGet package ids are case-insensitive; versions are SemVer 2.0 with
//! legacy four-part exceptions, so the raw version string is preserved for
//! registry round-trips and only parsed opportunistically for ordering.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

/// A registry lookup key: package id plus version string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    id: String,
    version: String,
}

impl PackageId {
    /// Create a new package id. The id keeps its original casing for
    /// display; comparisons and registry URLs are case-insensitive.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        PackageId {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Get the package id as published.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the version string as requested.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Lowercased id, as used in registry flat-container URLs.
    pub fn id_lower(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// Lowercased version, as used in registry flat-container URLs.
    pub fn version_lower(&self) -> String {
        self.version.to_ascii_lowercase()
    }

    /// Parse the version as SemVer where possible. Legacy four-part
    /// versions (`1.0.0.0`) and other registry oddities yield `None`.
    pub fn semver(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }

    /// Whether two ids refer to the same package, ignoring version.
    pub fn same_package(&self, other: &PackageId) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
