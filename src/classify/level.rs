//! Action level filtering
//!
//! Holds the one table mapping classified actions to severity tiers, and
//! the per-run filter built from CLI args.

use crate::domain::{ActionLevel, ClassifiedAction, Severity};

/// Map a classified action to the run level it requires
///
/// Keep this the only place tiers are assigned.
pub fn severity(action: &ClassifiedAction) -> Severity {
    match action {
        ClassifiedAction::NoAction { .. } | ClassifiedAction::NeedsReview { .. } => {
            Severity::Informational
        }
        ClassifiedAction::Update { current, target } => {
            if current.crosses_major(target) {
                Severity::Requires(ActionLevel::Everything)
            } else {
                Severity::Requires(ActionLevel::NewReleases)
            }
        }
        ClassifiedAction::MarkObsolete { .. } => Severity::Requires(ActionLevel::Everything),
    }
}

/// Filter configuration for one run
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    /// Most permissive tier allowed to produce proposals
    pub action_level: ActionLevel,
    /// Packages to exclude
    pub exclude: Vec<String>,
    /// If non-empty, only process these packages
    pub only: Vec<String>,
}

impl RunFilter {
    /// Create a new RunFilter with default settings (process all)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the action level
    pub fn with_action_level(mut self, level: ActionLevel) -> Self {
        self.action_level = level;
        self
    }

    /// Set packages to exclude
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Set packages to include (only list)
    pub fn with_only(mut self, only: Vec<String>) -> Self {
        self.only = only;
        self
    }

    /// Check if a package should be processed based on filters
    pub fn should_process_package(&self, name: &str) -> bool {
        // --only takes precedence over --exclude
        if !self.only.is_empty() {
            return self.only.iter().any(|p| p == name);
        }
        !self.exclude.iter().any(|p| p == name)
    }

    /// True if the action may become a proposal at this run's level
    pub fn permits(&self, action: &ClassifiedAction) -> bool {
        action.is_proposable() && severity(action).allowed_at(self.action_level)
    }
}
