//! Diff output formatter for showing proposed metadata changes
//!
//! Prints the unified diff of every proposal, so `--dry-run --diff` can be
//! piped straight into `git apply`.

use crate::domain::{PackageReport, RunReport};
use crate::output::OutputFormatter;
use std::io::Write;

/// Diff formatter for showing metadata changes
#[derive(Debug, Default)]
pub struct DiffFormatter;

impl DiffFormatter {
    /// Create a new diff formatter
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for DiffFormatter {
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        for entry in &report.packages {
            self.format_package(entry, writer)?;
        }
        self.format_summary(report, writer)
    }

    fn format_summary(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let verb = if report.dry_run {
            "would be proposed"
        } else {
            "proposed"
        };
        writeln!(
            writer,
            "# {} change(s) {}, {} need review, {} failed",
            report.proposed_count(),
            verb,
            report.needs_review_count(),
            report.failed_count()
        )
    }

    fn format_package(
        &self,
        entry: &PackageReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if !entry.outcome.is_proposed() {
            return Ok(());
        }
        let Some(diff) = entry.diff.as_deref() else {
            return Ok(());
        };
        write!(writer, "{}", diff)?;
        if !diff.ends_with('\n') {
            writeln!(writer)?;
        }
        Ok(())
    }
}
