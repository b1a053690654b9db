//! Package index adapters for fetching upstream release information
//!
//! This module provides:
//! - HTTP client shared foundation with retry logic
//! - PyPI JSON API adapter

mod client;
mod pypi;

pub use client::{HttpClient, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
pub use pypi::{parse_releases, PyPIAdapter, PYPI_API_URL, TYPED_CLASSIFIER};

use crate::classify::UpstreamRelease;
use crate::error::RegistryError;
use async_trait::async_trait;

/// Source of upstream releases
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Get the registry name
    fn registry_name(&self) -> &'static str;

    /// Fetch releases of a distribution, newest first, yanked releases
    /// excluded. An unknown distribution yields an empty list.
    async fn fetch_releases(&self, package: &str) -> Result<Vec<UpstreamRelease>, RegistryError>;
}
