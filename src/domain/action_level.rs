//! Action level: the per-run severity threshold

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How aggressive a run is allowed to be
///
/// Ordered from least to most permissive. An action whose required level is
/// above the run's level is skipped.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActionLevel {
    /// Least permissive; with the current tier table every proposal needs
    /// more than this, so the run only reports
    ObsoleteOnly,
    /// Also propose patch and minor version bumps
    NewReleases,
    /// Propose everything, including major bumps
    #[default]
    Everything,
}

impl ActionLevel {
    /// Returns the CLI name for this level
    pub fn cli_name(&self) -> &'static str {
        match self {
            ActionLevel::ObsoleteOnly => "obsolete-only",
            ActionLevel::NewReleases => "new-releases",
            ActionLevel::Everything => "everything",
        }
    }

    /// True if an action requiring `required` may run at this level
    pub fn permits(&self, required: ActionLevel) -> bool {
        required <= *self
    }
}

impl fmt::Display for ActionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}
