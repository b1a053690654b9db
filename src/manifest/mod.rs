//! Stub registry: the tracked stub packages of a checkout
//!
//! This module provides functionality to:
//! - Enumerate `stubs/*/METADATA.toml` in a stable order
//! - Load a single stub package by name
//! - Render metadata rewrites and diffs for proposals

mod metadata;

pub use metadata::{parse_metadata, render_action, unified_diff, METADATA_FILE};

use crate::domain::StubPackage;
use crate::error::MetadataError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory holding one sub-directory per stub package
pub const STUBS_DIR: &str = "stubs";

/// Read-only view of the stub packages in a repository checkout
#[derive(Debug, Clone)]
pub struct StubRegistry {
    root: PathBuf,
    last_known_good: Option<String>,
}

impl StubRegistry {
    /// Create a registry rooted at a repository checkout
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_known_good: None,
        }
    }

    /// Record the commit the checkout is at (builder pattern)
    pub fn with_last_known_good(mut self, commit: Option<String>) -> Self {
        self.last_known_good = commit;
        self
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of all stub packages, in lexical order
    pub fn names(&self) -> Result<Vec<String>, MetadataError> {
        let stubs_dir = self.root.join(STUBS_DIR);
        let entries =
            fs::read_dir(&stubs_dir).map_err(|e| MetadataError::read_error(&stubs_dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MetadataError::read_error(&stubs_dir, e))?;
            if !entry.path().join(METADATA_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load every stub package, in lexical order
    pub fn list_packages(&self) -> Result<Vec<StubPackage>, MetadataError> {
        self.names()?.iter().map(|name| self.load(name)).collect()
    }

    /// Load one stub package by name
    pub fn load(&self, name: &str) -> Result<StubPackage, MetadataError> {
        let relative = Self::metadata_path(name);
        let absolute = self.root.join(&relative);
        if !absolute.is_file() {
            return Err(MetadataError::not_found(name, &self.root));
        }

        let source =
            fs::read_to_string(&absolute).map_err(|e| MetadataError::read_error(&absolute, e))?;
        let mut package = parse_metadata(name, &relative, &source)?;
        package.last_known_good = self.last_known_good.clone();
        Ok(package)
    }

    /// Metadata path of a stub, relative to the repository root
    pub fn metadata_path(name: &str) -> PathBuf {
        Path::new(STUBS_DIR).join(name).join(METADATA_FILE)
    }
}
