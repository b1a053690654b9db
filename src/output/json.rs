//! JSON output formatter for machine processing
//!
//! The document schema is stable: `action_level`, `dry_run`, `success`,
//! `summary` and one `packages` entry per stub.

use crate::domain::{ActionLevel, PackageOutcome, PackageReport, RunReport, SkipReason, Version};
use crate::output::{OutputFormatter, Verbosity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

/// JSON formatter for machine-readable output
pub struct JsonFormatter {
    /// Verbose output includes diffs and filtered packages
    verbosity: Verbosity,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    fn includes(&self, entry: &PackageReport) -> bool {
        self.verbosity == Verbosity::Verbose
            || !matches!(
                entry.outcome,
                PackageOutcome::Skipped {
                    reason: SkipReason::Filtered,
                    ..
                }
            )
    }

    fn package_to_json<'a>(&self, entry: &'a PackageReport) -> JsonPackage<'a> {
        JsonPackage {
            package: &entry.package,
            upstream: &entry.upstream,
            current: &entry.current,
            latest: entry.latest.as_ref(),
            outcome: &entry.outcome,
            diff: if self.verbosity == Verbosity::Verbose {
                entry.diff.as_deref()
            } else {
                None
            },
        }
    }

    fn write_value<T: Serialize>(&self, value: &T, writer: &mut dyn Write) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
        writeln!(writer, "{}", json)
    }
}

/// JSON representation of the full run
#[derive(Serialize)]
struct JsonOutput<'a> {
    action_level: ActionLevel,
    dry_run: bool,
    success: bool,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    summary: JsonSummary,
    packages: Vec<JsonPackage<'a>>,
}

/// JSON representation of summary counts
#[derive(Serialize)]
struct JsonSummary {
    proposed: usize,
    skipped: usize,
    needs_review: usize,
    failed: usize,
}

impl From<&RunReport> for JsonSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            proposed: report.proposed_count(),
            skipped: report.skipped_count(),
            needs_review: report.needs_review_count(),
            failed: report.failed_count(),
        }
    }
}

/// JSON representation of a package entry
#[derive(Serialize)]
struct JsonPackage<'a> {
    package: &'a str,
    upstream: &'a str,
    current: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<&'a Version>,
    outcome: &'a PackageOutcome,
    /// Only in verbose mode
    #[serde(skip_serializing_if = "Option::is_none")]
    diff: Option<&'a str>,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let output = JsonOutput {
            action_level: report.action_level,
            dry_run: report.dry_run,
            success: report.is_success(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            summary: JsonSummary::from(report),
            packages: report
                .packages
                .iter()
                .filter(|p| self.includes(p))
                .map(|p| self.package_to_json(p))
                .collect(),
        };
        self.write_value(&output, writer)
    }

    fn format_summary(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        self.write_value(&JsonSummary::from(report), writer)
    }

    fn format_package(
        &self,
        entry: &PackageReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        self.write_value(&self.package_to_json(entry), writer)
    }
}
