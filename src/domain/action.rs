//! Classified action types

use super::{ActionLevel, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a package needs nothing this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoActionReason {
    /// Package already carries an obsolescence marker
    AlreadyObsolete,
    /// Package is flagged as no longer updated
    NoLongerUpdated,
    /// Nothing newer than the declared version
    UpToDate,
    /// Upstream only has pre-releases and the package does not track them
    NoStableRelease,
}

impl fmt::Display for NoActionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoActionReason::AlreadyObsolete => write!(f, "already marked obsolete"),
            NoActionReason::NoLongerUpdated => write!(f, "no longer updated"),
            NoActionReason::UpToDate => write!(f, "up to date"),
            NoActionReason::NoStableRelease => write!(f, "no stable release"),
        }
    }
}

/// Result of classifying one package against its upstream releases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifiedAction {
    /// Nothing to do
    NoAction { reason: NoActionReason },
    /// Raise the declared minimum version
    Update { current: Version, target: Version },
    /// Upstream ships its own types; mark the stubs obsolete
    MarkObsolete { since: Version },
    /// A human has to look at this package
    NeedsReview { reason: String },
}

/// Severity tier of a classified action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported regardless of level, never proposed
    Informational,
    /// Proposed only when the run level permits it
    Requires(ActionLevel),
}

impl Severity {
    /// True if this tier may produce a proposal at `level`
    pub fn allowed_at(&self, level: ActionLevel) -> bool {
        match self {
            Severity::Informational => true,
            Severity::Requires(required) => level.permits(*required),
        }
    }
}

impl ClassifiedAction {
    /// Creates a NoAction result
    pub fn no_action(reason: NoActionReason) -> Self {
        ClassifiedAction::NoAction { reason }
    }

    /// Creates an Update result
    pub fn update(current: Version, target: Version) -> Self {
        ClassifiedAction::Update { current, target }
    }

    /// Creates a NeedsReview result
    pub fn needs_review(reason: impl Into<String>) -> Self {
        ClassifiedAction::NeedsReview {
            reason: reason.into(),
        }
    }

    /// Severity tier, from the single mapping table in `classify::level`
    pub fn severity(&self) -> Severity {
        crate::classify::severity(self)
    }

    /// True if this action mutates metadata when proposed
    pub fn is_proposable(&self) -> bool {
        matches!(
            self,
            ClassifiedAction::Update { .. } | ClassifiedAction::MarkObsolete { .. }
        )
    }

    /// Short machine name used in branch names and dedup keys
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedAction::NoAction { .. } => "none",
            ClassifiedAction::Update { .. } => "bump",
            ClassifiedAction::MarkObsolete { .. } => "obsolete",
            ClassifiedAction::NeedsReview { .. } => "review",
        }
    }

    /// The version a proposal would target
    pub fn target_version(&self) -> Option<&Version> {
        match self {
            ClassifiedAction::Update { target, .. } => Some(target),
            ClassifiedAction::MarkObsolete { since } => Some(since),
            _ => None,
        }
    }
}

impl fmt::Display for ClassifiedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifiedAction::NoAction { reason } => write!(f, "no action ({})", reason),
            ClassifiedAction::Update { current, target } => {
                write!(f, "update {} → {}", current, target)
            }
            ClassifiedAction::MarkObsolete { since } => {
                write!(f, "mark obsolete since {}", since)
            }
            ClassifiedAction::NeedsReview { reason } => write!(f, "needs review: {}", reason),
        }
    }
}
