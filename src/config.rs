//! Validated run settings
//!
//! `CliArgs` is converted once into `Settings`; nothing past startup reads
//! the process environment.

use crate::classify::RunFilter;
use crate::cli::CliArgs;
use crate::domain::ActionLevel;
use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;

/// Settings for the run coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub action_level: ActionLevel,
    pub dry_run: bool,
    pub only: Vec<String>,
    pub exclude: Vec<String>,
    pub concurrency: usize,
    pub show_progress: bool,
}

impl RunConfig {
    /// Package and level filter for this run
    pub fn filter(&self) -> RunFilter {
        RunFilter::new()
            .with_action_level(self.action_level)
            .with_only(self.only.clone())
            .with_exclude(self.exclude.clone())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            action_level: ActionLevel::default(),
            dry_run: false,
            only: Vec::new(),
            exclude: Vec::new(),
            concurrency: crate::cli::DEFAULT_CONCURRENCY,
            show_progress: false,
        }
    }
}

/// Settings for the GitHub client
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub api_url: String,
    /// `owner/name`
    pub repository: String,
    pub token: String,
    pub base_branch: String,
}

impl GitHubConfig {
    /// Repository owner
    pub fn owner(&self) -> &str {
        self.repository
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(&self.repository)
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .field("base_branch", &self.base_branch)
            .finish()
    }
}

/// Everything the binary needs, validated
#[derive(Debug, Clone)]
pub struct Settings {
    pub repo_root: PathBuf,
    pub base_commit: Option<String>,
    pub index_url: String,
    pub run: RunConfig,
    pub github: GitHubConfig,
    pub alert_on_failure: bool,
    /// Link to this run's log
    pub run_url: Option<String>,
}

impl Settings {
    /// Validate CLI args into settings
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let token = args
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?
            .to_string();

        let repository = args
            .repo
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(ConfigError::MissingRepository)?;
        validate_repository(repository)?;

        validate_url("--api-url", &args.api_url)?;
        validate_url("--index-url", &args.index_url)?;
        if let Some(url) = &args.run_url {
            validate_url("--run-url", url)?;
        }

        if !args.repo_root.is_dir() {
            return Err(ConfigError::InvalidPath {
                path: args.repo_root.clone(),
                message: "not a directory".to_string(),
            });
        }

        let overlap: Vec<&String> = args
            .only
            .iter()
            .filter(|name| args.exclude.contains(name))
            .collect();
        if !overlap.is_empty() {
            return Err(ConfigError::ConflictingOptions {
                message: format!(
                    "packages both in --only and --exclude: {}",
                    overlap
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            });
        }

        let run_url = args.run_url.clone().or_else(|| {
            args.run_id.as_ref().map(|id| {
                format!(
                    "{}/{}/actions/runs/{}",
                    args.server_url.trim_end_matches('/'),
                    repository,
                    id
                )
            })
        });

        Ok(Self {
            repo_root: args.repo_root.clone(),
            base_commit: args.base_commit.clone().filter(|c| !c.trim().is_empty()),
            index_url: args.index_url.clone(),
            run: RunConfig {
                action_level: args.action_level,
                dry_run: args.dry_run,
                only: args.only.clone(),
                exclude: args.exclude.clone(),
                concurrency: args.concurrency,
                show_progress: args.show_progress(),
            },
            github: GitHubConfig {
                api_url: args.api_url.clone(),
                repository: repository.to_string(),
                token,
                base_branch: args.base_branch.clone(),
            },
            alert_on_failure: args.alert_on_failure,
            run_url,
        })
    }
}

fn validate_repository(value: &str) -> Result<(), ConfigError> {
    let valid = match value.split_once('/') {
        Some((owner, name)) => {
            !owner.is_empty() && !name.is_empty() && !name.contains('/') && !value.contains(' ')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidRepository {
            value: value.to_string(),
        })
    }
}

fn validate_url(option: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            option: option.to_string(),
            value: value.to_string(),
        }),
    }
}
