//! CLI argument parsing module for stubsabot

use crate::domain::ActionLevel;
use crate::hosting::DEFAULT_API_URL;
use crate::registry::PYPI_API_URL;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Default number of packages processed at once
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for --concurrency
const MAX_CONCURRENCY: usize = 64;

/// Parse a worker count between 1 and MAX_CONCURRENCY
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", s))?;
    if n == 0 || n > MAX_CONCURRENCY {
        return Err(format!("must be between 1 and {}", MAX_CONCURRENCY));
    }
    Ok(n)
}

/// Keeps type-stub packages in sync with their upstream releases
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stubsabot",
    version,
    about = "Keeps type-stub packages in sync with their upstream releases"
)]
pub struct CliArgs {
    /// Repository checkout containing stubs/*/METADATA.toml
    #[arg(default_value = ".")]
    pub repo_root: PathBuf,

    /// Most aggressive kind of change this run may propose
    #[arg(long, value_enum, default_value_t = ActionLevel::Everything)]
    pub action_level: ActionLevel,

    // Hosting options
    /// Target repository as owner/name
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repo: Option<String>,

    /// Branch proposals are opened against
    #[arg(long, default_value = "main")]
    pub base_branch: String,

    /// Commit the checkout is at; proposals are built on it
    #[arg(long, env = "GITHUB_SHA")]
    pub base_commit: Option<String>,

    /// API token for the hosting platform
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Hosting API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Package index base URL (PyPI JSON API or a mirror)
    #[arg(long, default_value = PYPI_API_URL)]
    pub index_url: String,

    // Package filters
    /// Process only these stub packages (can be specified multiple times)
    #[arg(long, action = ArgAction::Append)]
    pub only: Vec<String>,

    /// Skip these stub packages (can be specified multiple times)
    #[arg(long, action = ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Number of packages processed concurrently
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    // General options
    /// Dry run mode - classify and render proposals without publishing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Enable quiet mode - minimal output
    #[arg(short, long)]
    pub quiet: bool,

    // Output options
    /// Output the run report in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show proposed metadata changes as unified diffs
    #[arg(long)]
    pub diff: bool,

    // Alerting
    /// File an issue when the run fails
    #[arg(long)]
    pub alert_on_failure: bool,

    /// Link to this run's log, used in alert issues
    #[arg(long)]
    pub run_url: Option<String>,

    /// Server URL used to derive the run link
    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com", hide = true)]
    pub server_url: String,

    /// Workflow run id used to derive the run link
    #[arg(long, env = "GITHUB_RUN_ID", hide = true)]
    pub run_id: Option<String>,
}

impl CliArgs {
    /// Whether to draw progress bars
    pub fn show_progress(&self) -> bool {
        !self.quiet && !self.json
    }
}
