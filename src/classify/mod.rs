//! Action classification for stub packages
//!
//! This module provides:
//! - Upstream release info from the package index
//! - The severity table and per-run filter
//! - The classifier that decides what a stub package needs

mod level;
mod release;

pub use level::{severity, RunFilter};
pub use release::{sort_newest_first, UpstreamRelease};

use crate::domain::{ClassifiedAction, NoActionReason, StubPackage};

/// Reason reported when the index has no releases for the upstream
pub const VANISHED: &str = "upstream distribution vanished";
/// Reason reported when the latest release reaches the declared upper bound
pub const UPPER_BOUND_EXCEEDED: &str = "upper bound exceeded";

/// Pure decision engine mapping a stub package and its upstream releases
/// to a classified action
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionClassifier;

impl ActionClassifier {
    /// Create a new ActionClassifier
    pub fn new() -> Self {
        Self
    }

    /// Classify one package
    pub fn classify(&self, package: &StubPackage, releases: &[UpstreamRelease]) -> ClassifiedAction {
        if package.is_obsolete() {
            return ClassifiedAction::no_action(NoActionReason::AlreadyObsolete);
        }
        if package.no_longer_updated {
            return ClassifiedAction::no_action(NoActionReason::NoLongerUpdated);
        }

        if releases.is_empty() {
            return ClassifiedAction::needs_review(VANISHED);
        }

        let Some(latest) = latest_release(releases, package.prerelease) else {
            return ClassifiedAction::no_action(NoActionReason::NoStableRelease);
        };

        if package.min_version.covers(&latest.version) {
            return ClassifiedAction::no_action(NoActionReason::UpToDate);
        }

        if latest.typed {
            return ClassifiedAction::MarkObsolete {
                since: latest.version.clone(),
            };
        }

        if let Some(max) = &package.max_version {
            if latest.version >= *max {
                return ClassifiedAction::needs_review(UPPER_BOUND_EXCEEDED);
            }
        }

        ClassifiedAction::update(package.min_version.version.clone(), latest.version.clone())
    }
}

/// Newest eligible release, ignoring the order the slice is in
pub fn latest_release(
    releases: &[UpstreamRelease],
    include_prereleases: bool,
) -> Option<&UpstreamRelease> {
    releases
        .iter()
        .filter(|r| r.is_eligible(include_prereleases))
        .max()
}
