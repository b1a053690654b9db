//! PEP 440 versions and the minimum-version constraint stored in stub metadata
//!
//! Handles version strings like:
//! - Final releases: `1.2.0`, `v1.2`, `1!2.0`
//! - Pre-releases: `1.0.0a1`, `1.0b2`, `2.0rc1`, `1.0.dev3`
//! - Post-releases and local labels: `2.0.post1`, `1.0-1`, `1.0+ubuntu1`
//! - Wildcard constraints: `1.2.*`

use crate::error::VersionParseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^v?(?:(?P<epoch>\d+)!)?(?P<release>\d+(?:\.\d+)*)(?:[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>\d+)?)?(?:-(?P<post_n1>\d+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>\d+)?)?(?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>\d+)?)?(?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?$",
    )
    .unwrap()
});

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrePhase {
    Alpha,
    Beta,
    ReleaseCandidate,
}

impl PrePhase {
    fn from_label(label: &str) -> Self {
        match label {
            "a" | "alpha" => PrePhase::Alpha,
            "b" | "beta" => PrePhase::Beta,
            _ => PrePhase::ReleaseCandidate,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PrePhase::Alpha => "a",
            PrePhase::Beta => "b",
            PrePhase::ReleaseCandidate => "rc",
        }
    }
}

// Variant order is the precedence order.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PrePhase, u64),
    Final,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum DevKey {
    Dev(u64),
    Final,
}

/// A parsed, totally ordered PEP 440 version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PrePhase, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<String>,
}

impl Version {
    /// Parse a version string
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let normalized = s.trim().to_ascii_lowercase();
        let caps = VERSION_RE
            .captures(&normalized)
            .ok_or_else(|| VersionParseError {
                value: s.to_string(),
            })?;

        let number = |name: &str| -> Result<Option<u64>, VersionParseError> {
            caps.name(name)
                .map(|m| {
                    m.as_str().parse::<u64>().map_err(|_| VersionParseError {
                        value: s.to_string(),
                    })
                })
                .transpose()
        };

        let release = caps["release"]
            .split('.')
            .map(|p| {
                p.parse::<u64>().map_err(|_| VersionParseError {
                    value: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pre = match caps.name("pre_l") {
            Some(label) => Some((
                PrePhase::from_label(label.as_str()),
                number("pre_n")?.unwrap_or(0),
            )),
            None => None,
        };

        let post = if let Some(n) = number("post_n1")? {
            Some(n)
        } else if caps.name("post_l").is_some() {
            Some(number("post_n2")?.unwrap_or(0))
        } else {
            None
        };

        let dev = if caps.name("dev_l").is_some() {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };

        Ok(Self {
            epoch: number("epoch")?.unwrap_or(0),
            release,
            pre,
            post,
            dev,
            local: caps.name("local").map(|m| m.as_str().to_string()),
        })
    }

    /// Release segments (`[1, 2, 0]` for `1.2.0`)
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    /// Major release segment
    pub fn major(&self) -> u64 {
        self.release.first().copied().unwrap_or(0)
    }

    /// Epoch (`1` for `1!2.0`)
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True for alpha/beta/rc and dev releases
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    /// True when the two versions differ in epoch or major segment
    pub fn crosses_major(&self, other: &Version) -> bool {
        self.epoch != other.epoch || self.major() != other.major()
    }

    /// The final release with only the first `segments` release numbers
    pub fn truncated(&self, segments: usize) -> Version {
        let mut release: Vec<u64> = self.release.iter().copied().take(segments).collect();
        while release.len() < segments {
            release.push(0);
        }
        Version {
            epoch: self.epoch,
            release,
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// True when `self` starts with all release segments of `prefix`
    pub fn has_release_prefix(&self, prefix: &Version) -> bool {
        if self.epoch != prefix.epoch {
            return false;
        }
        prefix
            .release
            .iter()
            .enumerate()
            .all(|(i, seg)| self.release.get(i).copied().unwrap_or(0) == *seg)
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some((phase, n)), _, _) => PreKey::Pre(phase, n),
            _ => PreKey::Final,
        }
    }

    fn dev_key(&self) -> DevKey {
        match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::Final,
        }
    }
}

/// Compare release segments, treating missing trailing segments as zero
fn cmp_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let pa = a.get(i).copied().unwrap_or(0);
        let pb = b.get(i).copied().unwrap_or(0);
        match pa.cmp(&pb) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| cmp_release(&self.release, &other.release))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| self.dev_key().cmp(&other.dev_key()))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((phase, n)) = self.pre {
            write!(f, "{}{}", phase.label(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(local) = &self.local {
            write!(f, "+{}", local)?;
        }
        Ok(())
    }
}

/// The minimum upstream version declared in stub metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// The raw string as it appears in the metadata
    pub raw: String,
    /// The declared version (wildcard stripped)
    pub version: Version,
    /// True for `1.2.*` style constraints
    pub wildcard: bool,
}

impl VersionConstraint {
    /// Parse a constraint such as `1.2.0` or `1.2.*`
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        let raw = s.trim();
        let (base, wildcard) = match raw.strip_suffix(".*") {
            Some(base) => (base, true),
            None => (raw, false),
        };
        let version = Version::parse(base)?;
        if wildcard && version.is_prerelease() {
            return Err(VersionParseError {
                value: s.to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            version,
            wildcard,
        })
    }

    /// True when `candidate` is not newer than what this constraint declares
    pub fn covers(&self, candidate: &Version) -> bool {
        if candidate <= &self.version {
            return true;
        }
        self.wildcard && candidate.has_release_prefix(&self.version)
    }

    /// Render the constraint bumped to `target`, keeping the wildcard precision
    pub fn bumped_to(&self, target: &Version) -> String {
        if self.wildcard {
            format!("{}.*", target.truncated(self.version.release().len()))
        } else {
            target.to_string()
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
