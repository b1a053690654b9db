//! PyPI JSON API adapter
//!
//! Fetches release information from PyPI or a compatible mirror.
//! API endpoint: https://pypi.org/pypi/{package}/json

use crate::classify::{sort_newest_first, UpstreamRelease};
use crate::error::RegistryError;
use crate::registry::{HttpClient, ReleaseSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// PyPI API base URL
pub const PYPI_API_URL: &str = "https://pypi.org/pypi";

/// Trove classifier for packages that ship their own type information
pub const TYPED_CLASSIFIER: &str = "Typing :: Typed";

/// PyPI adapter
pub struct PyPIAdapter {
    client: HttpClient,
    base_url: String,
}

/// PyPI package metadata response
#[derive(Debug, Deserialize)]
struct PyPIResponse {
    /// Metadata of the latest release
    info: PackageInfo,
    /// Release files keyed by version
    #[serde(default)]
    releases: HashMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    /// Version the `info` block describes
    version: String,
    #[serde(default)]
    classifiers: Vec<String>,
}

/// Release file information
#[derive(Debug, Deserialize)]
struct ReleaseFile {
    /// Upload time for the release file
    upload_time_iso_8601: Option<String>,
    #[serde(default)]
    yanked: bool,
}

impl PyPIAdapter {
    /// Create a new PyPI adapter against the public index
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, PYPI_API_URL)
    }

    /// Create a PyPI adapter against a mirror
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the URL for a package
    fn build_url(&self, package: &str) -> String {
        format!("{}/{}/json", self.base_url, package)
    }
}

/// Turn a PyPI JSON document into releases, newest first
///
/// Releases without files are dropped. A release counts as yanked only if
/// every file is yanked. Unparseable legacy versions are skipped.
pub fn parse_releases(body: &str, package: &str) -> Result<Vec<UpstreamRelease>, RegistryError> {
    let response: PyPIResponse =
        serde_json::from_str(body).map_err(|e| RegistryError::InvalidResponse {
            package: package.to_string(),
            registry: "PyPI".to_string(),
            message: format!("failed to parse JSON: {}", e),
        })?;
    Ok(collect_releases(response, package))
}

fn collect_releases(response: PyPIResponse, package: &str) -> Vec<UpstreamRelease> {
    let latest_typed = response
        .info
        .classifiers
        .iter()
        .any(|c| c == TYPED_CLASSIFIER);

    let mut releases = Vec::new();
    for (raw, files) in response.releases {
        if files.is_empty() {
            continue;
        }

        let mut release = match UpstreamRelease::parse(&raw) {
            Ok(release) => release,
            Err(e) => {
                tracing::debug!(package, version = %raw, error = %e, "skipping release");
                continue;
            }
        };

        let earliest = files
            .iter()
            .filter_map(|f| f.upload_time_iso_8601.as_deref())
            .filter_map(|t| t.parse::<DateTime<Utc>>().ok())
            .min();
        if let Some(released_at) = earliest {
            release = release.with_released_at(released_at);
        }

        let yanked = files.iter().all(|f| f.yanked);
        let typed = latest_typed && raw == response.info.version;
        releases.push(release.with_yanked(yanked).with_typed(typed));
    }

    sort_newest_first(&mut releases);
    releases
}

#[async_trait]
impl ReleaseSource for PyPIAdapter {
    fn registry_name(&self) -> &'static str {
        "PyPI"
    }

    async fn fetch_releases(&self, package: &str) -> Result<Vec<UpstreamRelease>, RegistryError> {
        let url = self.build_url(package);
        let response: Option<PyPIResponse> = self
            .client
            .get_json_optional(&url, package, self.registry_name())
            .await?;

        let Some(response) = response else {
            tracing::info!(package, "distribution not found on index");
            return Ok(Vec::new());
        };

        let releases: Vec<UpstreamRelease> = collect_releases(response, package)
            .into_iter()
            .filter(|r| !r.yanked)
            .collect();
        tracing::debug!(package, count = releases.len(), "fetched releases");
        Ok(releases)
    }
}
