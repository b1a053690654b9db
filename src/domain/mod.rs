//! Core domain models for stubsabot
//!
//! This module contains the fundamental types used throughout the application:
//! - PEP 440 versions and the declared version constraint of a stub
//! - Tracked stub packages
//! - Action levels and classified actions
//! - Per-package outcomes and the run report

mod action;
mod action_level;
mod report;
mod stub_package;
mod version;

pub use action::{ClassifiedAction, NoActionReason, Severity};
pub use action_level::ActionLevel;
pub use report::{PackageOutcome, PackageReport, RunReport, SkipReason};
pub use stub_package::StubPackage;
pub use version::{PrePhase, Version, VersionConstraint};
