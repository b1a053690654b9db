//! Upstream release information
//!
//! This module provides the UpstreamRelease struct that represents
//! one release of an upstream distribution as seen on the package index.

use crate::domain::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Information about an upstream release from the package index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamRelease {
    /// Parsed version
    pub version: Version,
    /// The version string exactly as published
    pub raw: String,
    /// Earliest upload time of any file in the release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
    /// Alpha, beta, rc or dev release
    pub prerelease: bool,
    /// Every uploaded file was yanked
    pub yanked: bool,
    /// Upstream declares `Typing :: Typed`
    pub typed: bool,
}

impl UpstreamRelease {
    /// Create a release from a parsed version
    pub fn new(version: Version) -> Self {
        Self {
            raw: version.to_string(),
            prerelease: version.is_prerelease(),
            version,
            released_at: None,
            yanked: false,
            typed: false,
        }
    }

    /// Parse a release from a raw version string
    pub fn parse(raw: &str) -> Result<Self, crate::error::VersionParseError> {
        let version = Version::parse(raw)?;
        Ok(Self {
            raw: raw.to_string(),
            ..Self::new(version)
        })
    }

    /// Set the release date (builder pattern)
    pub fn with_released_at(mut self, released_at: DateTime<Utc>) -> Self {
        self.released_at = Some(released_at);
        self
    }

    /// Set the yanked flag (builder pattern)
    pub fn with_yanked(mut self, yanked: bool) -> Self {
        self.yanked = yanked;
        self
    }

    /// Set the typed flag (builder pattern)
    pub fn with_typed(mut self, typed: bool) -> Self {
        self.typed = typed;
        self
    }

    /// A release is eligible unless yanked, and unless it is a prerelease
    /// while pre-releases are not tracked
    pub fn is_eligible(&self, include_prereleases: bool) -> bool {
        !self.yanked && (include_prereleases || !self.prerelease)
    }
}

/// Ordered by version; equal versions spelled differently (`1.0`, `1.0.0`)
/// fall back to the remaining fields so the order agrees with `Eq`
impl Ord for UpstreamRelease {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.raw.cmp(&other.raw))
            .then_with(|| self.released_at.cmp(&other.released_at))
            .then_with(|| self.prerelease.cmp(&other.prerelease))
            .then_with(|| self.yanked.cmp(&other.yanked))
            .then_with(|| self.typed.cmp(&other.typed))
    }
}

impl PartialOrd for UpstreamRelease {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort releases newest first
pub fn sort_newest_first(releases: &mut [UpstreamRelease]) {
    releases.sort_by(|a, b| b.cmp(a));
}
