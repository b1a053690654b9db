//! Tracked stub package structures

use super::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A stub package tracked by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubPackage {
    /// Stub name (its directory under `stubs/`)
    pub name: String,
    /// Upstream distribution on the package index
    pub upstream: String,
    /// Declared minimum upstream version
    pub min_version: VersionConstraint,
    /// Optional exclusive upper bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<Version>,
    /// Version at which the package was marked obsolete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obsolete_since: Option<String>,
    /// Upstream is no longer followed
    pub no_longer_updated: bool,
    /// Track pre-releases when resolving the latest release
    pub prerelease: bool,
    /// Metadata file path, relative to the repository root
    pub metadata_path: PathBuf,
    /// Metadata file contents as loaded
    #[serde(skip)]
    pub metadata_source: String,
    /// Commit the registry was read at, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_good: Option<String>,
}

impl StubPackage {
    /// Creates a stub package with default flags
    pub fn new(
        name: impl Into<String>,
        upstream: impl Into<String>,
        min_version: VersionConstraint,
    ) -> Self {
        let name = name.into();
        let metadata_path = PathBuf::from("stubs").join(&name).join("METADATA.toml");
        Self {
            name,
            upstream: upstream.into(),
            min_version,
            max_version: None,
            obsolete_since: None,
            no_longer_updated: false,
            prerelease: false,
            metadata_path,
            metadata_source: String::new(),
            last_known_good: None,
        }
    }

    /// Sets the exclusive upper bound (builder pattern)
    pub fn with_max_version(mut self, max: Version) -> Self {
        self.max_version = Some(max);
        self
    }

    /// Marks the package obsolete since `version` (builder pattern)
    pub fn with_obsolete_since(mut self, version: impl Into<String>) -> Self {
        self.obsolete_since = Some(version.into());
        self
    }

    /// Opts into pre-release tracking (builder pattern)
    pub fn with_prerelease(mut self, prerelease: bool) -> Self {
        self.prerelease = prerelease;
        self
    }

    /// Sets the raw metadata source (builder pattern)
    pub fn with_metadata_source(mut self, source: impl Into<String>) -> Self {
        self.metadata_source = source.into();
        self
    }

    /// Returns true if the package carries an obsolescence marker
    pub fn is_obsolete(&self) -> bool {
        self.obsolete_since.is_some()
    }

    /// Derive the upstream distribution name from a stub directory name
    pub fn default_upstream(stub_name: &str) -> String {
        let name = stub_name.strip_prefix("types-").unwrap_or(stub_name);
        let name = name.strip_suffix("-stubs").unwrap_or(name);
        name.to_string()
    }
}

impl fmt::Display for StubPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}>={}", self.name, self.upstream, self.min_version)?;
        if let Some(max) = &self.max_version {
            write!(f, ",<{}", max)?;
        }
        write!(f, ")")?;
        if self.is_obsolete() {
            write!(f, " [obsolete]")?;
        }
        Ok(())
    }
}
