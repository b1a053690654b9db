//! Structured logging setup
//!
//! Logs go to stderr so stdout carries only the report. `RUST_LOG`
//! overrides the level picked from `--verbose` / `--quiet`.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Default log level for the given output flags
pub fn default_level(verbose: bool, quiet: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Install the global subscriber
///
/// Does nothing if a subscriber is already installed.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level(verbose, quiet).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
