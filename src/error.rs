//! Application error types using thiserror
//!
//! Error hierarchy:
//! - ConfigError: missing credentials or invalid settings (fatal)
//! - MetadataError: stub metadata that cannot be read or parsed (fatal at startup)
//! - RegistryError: package index communication (per-package)
//! - HostingError: code hosting API communication (per-package)

use std::path::PathBuf;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Stub metadata related errors
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// Package index related errors
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Hosting collaborator related errors
    #[error(transparent)]
    Hosting(#[from] HostingError),
}

/// A version string that is not a valid PEP 440 version
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version '{value}'")]
pub struct VersionParseError {
    pub value: String,
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No API token in the environment
    #[error("missing hosting API token: set GITHUB_TOKEN")]
    MissingToken,

    /// No target repository
    #[error("missing target repository: pass --repo or set GITHUB_REPOSITORY")]
    MissingRepository,

    /// Repository slug is not owner/name
    #[error("invalid repository '{value}': expected 'owner/name'")]
    InvalidRepository { value: String },

    /// URL that does not parse as http(s)
    #[error("invalid URL '{value}' for {option}")]
    InvalidUrl { option: String, value: String },

    /// Invalid path
    #[error("invalid path '{path}': {message}")]
    InvalidPath { path: PathBuf, message: String },

    /// Conflicting options
    #[error("conflicting options: {message}")]
    ConflictingOptions { message: String },

    /// HTTP client could not be built
    #[error("failed to create HTTP client: {message}")]
    HttpClient { message: String },
}

/// Errors related to stub metadata files
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Stub package not present in the registry
    #[error("stub package '{name}' not found in {root}")]
    NotFound { name: String, root: PathBuf },

    /// Failed to read a metadata file
    #[error("failed to read metadata file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("failed to parse TOML in {path}: {message}")]
    TomlParseError { path: PathBuf, message: String },

    /// Invalid version specification
    #[error("invalid version '{value}' for '{field}' in {path}: {message}")]
    InvalidVersion {
        path: PathBuf,
        field: String,
        value: String,
        message: String,
    },

    /// The metadata could not be rewritten for a proposal
    #[error("cannot update {path}: {message}")]
    RenderError { path: PathBuf, message: String },
}

/// Errors related to package index communication
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Network request failed
    #[error("failed to fetch package '{package}' from {registry}: {message}")]
    NetworkError {
        package: String,
        registry: String,
        message: String,
    },

    /// The index answered with a 5xx status
    #[error("{registry} returned HTTP {status} for '{package}'")]
    ServerError {
        package: String,
        registry: String,
        status: u16,
    },

    /// The index answered with a non-retryable 4xx status
    #[error("{registry} rejected request for '{package}': HTTP {status}")]
    ClientError {
        package: String,
        registry: String,
        status: u16,
    },

    /// Rate limit exceeded
    #[error("rate limit exceeded for {registry} registry")]
    RateLimitExceeded { registry: String },

    /// Invalid response from registry
    #[error("invalid response from {registry} for '{package}': {message}")]
    InvalidResponse {
        package: String,
        registry: String,
        message: String,
    },

    /// Timeout
    #[error("timeout while fetching '{package}' from {registry}")]
    Timeout { package: String, registry: String },

    /// Retries exhausted
    #[error("{registry} unavailable for '{package}' after {attempts} attempts: {message}")]
    SourceUnavailable {
        package: String,
        registry: String,
        attempts: u32,
        message: String,
    },
}

/// Errors related to the code hosting API
#[derive(Error, Debug)]
pub enum HostingError {
    /// The branch to publish already exists
    #[error("branch '{branch}' already exists")]
    Conflict { branch: String },

    /// The hosting API refused the request
    #[error("hosting API rejected {operation}: HTTP {status}: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },

    /// Network request failed
    #[error("hosting API request for {operation} failed: {message}")]
    NetworkError { operation: String, message: String },

    /// Rate limit exceeded
    #[error("hosting API rate limit exceeded during {operation}")]
    RateLimitExceeded { operation: String },

    /// Timeout
    #[error("timeout during {operation}")]
    Timeout { operation: String },

    /// Invalid response body
    #[error("invalid response for {operation}: {message}")]
    InvalidResponse { operation: String, message: String },
}

impl MetadataError {
    /// Creates a new NotFound error
    pub fn not_found(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        MetadataError::NotFound {
            name: name.into(),
            root: root.into(),
        }
    }

    /// Creates a new ReadError
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MetadataError::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates a new TomlParseError
    pub fn toml_parse_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        MetadataError::TomlParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new InvalidVersion error
    pub fn invalid_version(
        path: impl Into<PathBuf>,
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MetadataError::InvalidVersion {
            path: path.into(),
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }
}

impl RegistryError {
    /// Creates a new NetworkError
    pub fn network_error(
        package: impl Into<String>,
        registry: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        RegistryError::NetworkError {
            package: package.into(),
            registry: registry.into(),
            message: message.into(),
        }
    }

    /// Creates a new RateLimitExceeded error
    pub fn rate_limit_exceeded(registry: impl Into<String>) -> Self {
        RegistryError::RateLimitExceeded {
            registry: registry.into(),
        }
    }

    /// Creates a new Timeout error
    pub fn timeout(package: impl Into<String>, registry: impl Into<String>) -> Self {
        RegistryError::Timeout {
            package: package.into(),
            registry: registry.into(),
        }
    }

    /// Connection errors, timeouts, 5xx and rate limits are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::NetworkError { .. }
                | RegistryError::ServerError { .. }
                | RegistryError::RateLimitExceeded { .. }
                | RegistryError::Timeout { .. }
        )
    }
}

impl HostingError {
    /// Creates a new Rejected error
    pub fn rejected(operation: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        HostingError::Rejected {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }

    /// Connection errors, timeouts, 5xx and rate limits are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            HostingError::Rejected { status, .. } => *status >= 500,
            HostingError::NetworkError { .. }
            | HostingError::RateLimitExceeded { .. }
            | HostingError::Timeout { .. } => true,
            HostingError::Conflict { .. } | HostingError::InvalidResponse { .. } => false,
        }
    }
}
