//! stubsabot - keeps type-stub packages in sync with their upstream releases
//!
//! This library provides the core functionality for a stub registry bot:
//! - Reading `stubs/*/METADATA.toml` into tracked packages
//! - Fetching upstream releases from PyPI
//! - Classifying each package into an action and a severity tier
//! - Proposing metadata changes as pull requests on GitHub
//! - Alerting when a run fails

pub mod alert;
pub mod classify;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod hosting;
pub mod logging;
pub mod manifest;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod proposer;
pub mod registry;
pub mod retry;
