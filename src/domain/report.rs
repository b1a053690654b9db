//! Run report types
//!
//! Provides structures for tracking outcomes at package and run levels.

use super::{ActionLevel, ClassifiedAction, NoActionReason, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason why a package produced no proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The classifier found nothing to do
    NoAction(NoActionReason),
    /// The action needs a more permissive run level
    BelowActionLevel,
    /// The same proposal is already open
    Duplicate,
    /// The same proposal was closed without merging
    PreviouslyRejected,
    /// The same proposal was already merged
    AlreadyMerged,
    /// Another proposal for this package is still open
    ProposalPending { branch: String },
    /// Package was excluded via --exclude or --only
    Filtered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoAction(reason) => write!(f, "{}", reason),
            SkipReason::BelowActionLevel => write!(f, "below action level"),
            SkipReason::Duplicate => write!(f, "duplicate"),
            SkipReason::PreviouslyRejected => write!(f, "previously rejected"),
            SkipReason::AlreadyMerged => write!(f, "already merged"),
            SkipReason::ProposalPending { branch } => {
                write!(f, "another proposal is open ({})", branch)
            }
            SkipReason::Filtered => write!(f, "filtered"),
        }
    }
}

/// Outcome for a single package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PackageOutcome {
    /// A proposal was published (or rendered, in dry-run mode)
    Proposed {
        action: ClassifiedAction,
        branch: String,
        /// Pull request URL; absent in dry-run mode
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// No proposal was made
    Skipped {
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<ClassifiedAction>,
        reason: SkipReason,
    },
    /// Surfaced for a human; not a failure
    NeedsReview { reason: String },
    /// Processing failed
    Failed { error: String },
}

impl PackageOutcome {
    /// Creates a Skipped outcome for a classified action
    pub fn skipped(action: ClassifiedAction, reason: SkipReason) -> Self {
        PackageOutcome::Skipped {
            action: Some(action),
            reason,
        }
    }

    /// Creates a Failed outcome
    pub fn failed(error: impl fmt::Display) -> Self {
        PackageOutcome::Failed {
            error: error.to_string(),
        }
    }

    /// Returns true if a proposal was made
    pub fn is_proposed(&self) -> bool {
        matches!(self, PackageOutcome::Proposed { .. })
    }

    /// Returns true if the package was skipped
    pub fn is_skipped(&self) -> bool {
        matches!(self, PackageOutcome::Skipped { .. })
    }

    /// Returns true if the package needs a human
    pub fn is_needs_review(&self) -> bool {
        matches!(self, PackageOutcome::NeedsReview { .. })
    }

    /// Returns true if processing failed
    pub fn is_failed(&self) -> bool {
        matches!(self, PackageOutcome::Failed { .. })
    }
}

impl fmt::Display for PackageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOutcome::Proposed { action, url, .. } => match url {
                Some(url) => write!(f, "proposed {} ({})", action, url),
                None => write!(f, "proposed {}", action),
            },
            PackageOutcome::Skipped { reason, .. } => write!(f, "skipped ({})", reason),
            PackageOutcome::NeedsReview { reason } => write!(f, "needs review ({})", reason),
            PackageOutcome::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// Report entry for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReport {
    /// Stub name
    pub package: String,
    /// Upstream distribution name
    pub upstream: String,
    /// Declared minimum version at the start of the run
    pub current: String,
    /// Latest release considered by the classifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Version>,
    /// What happened
    pub outcome: PackageOutcome,
    /// Unified diff of the proposed metadata change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl PackageReport {
    /// Creates a new PackageReport
    pub fn new(
        package: impl Into<String>,
        upstream: impl Into<String>,
        current: impl Into<String>,
        outcome: PackageOutcome,
    ) -> Self {
        Self {
            package: package.into(),
            upstream: upstream.into(),
            current: current.into(),
            latest: None,
            outcome,
            diff: None,
        }
    }

    /// Sets the latest release (builder pattern)
    pub fn with_latest(mut self, latest: Option<Version>) -> Self {
        self.latest = latest;
        self
    }

    /// Replaces the outcome (builder pattern)
    pub fn with_outcome(mut self, outcome: PackageOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Sets the proposal diff (builder pattern)
    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }
}

/// Aggregate result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Level the run was allowed to act at
    pub action_level: ActionLevel,
    /// Whether proposals were only rendered
    pub dry_run: bool,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-package entries in registry order
    pub packages: Vec<PackageReport>,
}

impl RunReport {
    /// Creates a new, empty RunReport
    pub fn new(action_level: ActionLevel, dry_run: bool) -> Self {
        Self {
            action_level,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            packages: Vec::new(),
        }
    }

    /// Adds a package entry
    pub fn add(&mut self, entry: PackageReport) {
        self.packages.push(entry);
    }

    /// Marks the run as finished
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Returns the number of proposals made
    pub fn proposed_count(&self) -> usize {
        self.packages.iter().filter(|p| p.outcome.is_proposed()).count()
    }

    /// Returns the number of skipped packages
    pub fn skipped_count(&self) -> usize {
        self.packages.iter().filter(|p| p.outcome.is_skipped()).count()
    }

    /// Returns the number of packages needing review
    pub fn needs_review_count(&self) -> usize {
        self.packages
            .iter()
            .filter(|p| p.outcome.is_needs_review())
            .count()
    }

    /// Returns the number of failed packages
    pub fn failed_count(&self) -> usize {
        self.packages.iter().filter(|p| p.outcome.is_failed()).count()
    }

    /// Returns all failed entries
    pub fn failures(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages.iter().filter(|p| p.outcome.is_failed())
    }

    /// The run succeeded iff no package failed
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Looks up the entry for a package
    pub fn get(&self, package: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.package == package)
    }
}
