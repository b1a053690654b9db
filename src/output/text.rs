//! Text output formatter for human-readable display
//!
//! This module provides:
//! - Per-package lines grouped by outcome, with colors
//! - Change type labels (major/minor/obsolete)
//! - Skipped packages with reasons in verbose mode
//! - Summary line with counts

use crate::domain::{ClassifiedAction, PackageOutcome, PackageReport, RunReport, SkipReason};
use crate::output::{OutputFormatter, Verbosity};
use colored::Colorize;
use std::io::Write;

/// Kind of metadata change a proposal makes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Crosses a major version (or epoch)
    Major,
    /// Stays within the current major version
    Minor,
    /// Marks the stubs obsolete
    Obsolete,
}

impl ChangeType {
    /// Determine the change type of an action, if it changes anything
    pub fn from_action(action: &ClassifiedAction) -> Option<Self> {
        match action {
            ClassifiedAction::Update { current, target } if current.crosses_major(target) => {
                Some(ChangeType::Major)
            }
            ClassifiedAction::Update { .. } => Some(ChangeType::Minor),
            ClassifiedAction::MarkObsolete { .. } => Some(ChangeType::Obsolete),
            _ => None,
        }
    }

    /// Get the display label with color
    pub fn colored_label(&self) -> String {
        match self {
            ChangeType::Major => "major".red().bold().to_string(),
            ChangeType::Minor => "minor".green().to_string(),
            ChangeType::Obsolete => "obsolete".yellow().to_string(),
        }
    }

    /// Get the plain label
    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::Major => "major",
            ChangeType::Minor => "minor",
            ChangeType::Obsolete => "obsolete",
        }
    }
}

/// Text formatter for human-readable output
pub struct TextFormatter {
    /// Verbosity level
    verbosity: Verbosity,
    /// Whether to use colors
    color: bool,
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            color: true,
        }
    }

    /// Create a new text formatter with color option
    pub fn with_color(verbosity: Verbosity, color: bool) -> Self {
        Self { verbosity, color }
    }

    fn dry_run_prefix(&self, dry_run: bool) -> String {
        match (dry_run, self.color) {
            (true, true) => format!("{} ", "(dry-run)".cyan()),
            (true, false) => "(dry-run) ".to_string(),
            (false, _) => String::new(),
        }
    }

    /// Whether an entry is listed at the current verbosity
    fn is_listed(&self, entry: &PackageReport) -> bool {
        match &entry.outcome {
            PackageOutcome::Failed { .. } | PackageOutcome::NeedsReview { .. } => true,
            PackageOutcome::Proposed { .. } => self.verbosity != Verbosity::Quiet,
            PackageOutcome::Skipped { reason, .. } => {
                self.verbosity == Verbosity::Verbose && *reason != SkipReason::Filtered
            }
        }
    }

    fn section(
        &self,
        title: &str,
        entries: &[&PackageReport],
        name_width: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.color {
            writeln!(writer, "{}", title.bold())?;
        } else {
            writeln!(writer, "{}", title)?;
        }
        for entry in entries {
            self.write_line(entry, name_width, writer)?;
        }
        writeln!(writer)
    }

    fn write_line(
        &self,
        entry: &PackageReport,
        width: usize,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        let name = format!("{:width$}", entry.package, width = width);
        match &entry.outcome {
            PackageOutcome::Proposed { action, url, .. } => {
                let (from, to) = match action {
                    ClassifiedAction::Update { current, target } => {
                        (current.to_string(), target.to_string())
                    }
                    ClassifiedAction::MarkObsolete { since } => {
                        (entry.current.clone(), format!("obsolete since {}", since))
                    }
                    other => (entry.current.clone(), other.to_string()),
                };
                let change = ChangeType::from_action(action);
                let link = url.as_deref().map(|u| format!("  {}", u)).unwrap_or_default();
                if self.color {
                    let label = change.map(|c| c.colored_label()).unwrap_or_default();
                    writeln!(
                        writer,
                        "  {} {} {} {} [{}]{}",
                        name,
                        from.dimmed(),
                        "→".dimmed(),
                        to.bright_white().bold(),
                        label,
                        link.dimmed()
                    )
                } else {
                    let label = change.map(|c| c.label()).unwrap_or_default();
                    writeln!(writer, "  {} {} -> {} [{}]{}", name, from, to, label, link)
                }
            }
            PackageOutcome::NeedsReview { reason } => {
                let latest = entry
                    .latest
                    .as_ref()
                    .map(|v| format!(" (latest {})", v))
                    .unwrap_or_default();
                if self.color {
                    writeln!(writer, "  {} {}{}", name, reason.yellow(), latest.dimmed())
                } else {
                    writeln!(writer, "  {} {}{}", name, reason, latest)
                }
            }
            PackageOutcome::Failed { error } => {
                if self.color {
                    writeln!(writer, "  {} {}", name, error.red())
                } else {
                    writeln!(writer, "  {} {}", name, error)
                }
            }
            PackageOutcome::Skipped { reason, .. } => {
                let reason = format!("({})", reason);
                if self.color {
                    writeln!(writer, "  {} {}", name.dimmed(), reason.dimmed())
                } else {
                    writeln!(writer, "  {} {}", name, reason)
                }
            }
        }
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let listed: Vec<&PackageReport> =
            report.packages.iter().filter(|p| self.is_listed(p)).collect();
        let width = listed.iter().map(|p| p.package.len()).max().unwrap_or(0).max(20);

        let pick = |f: fn(&PackageOutcome) -> bool| -> Vec<&PackageReport> {
            listed.iter().copied().filter(|p| f(&p.outcome)).collect()
        };
        let prefix = self.dry_run_prefix(report.dry_run);
        let proposed_title = format!("{}Proposed:", prefix);

        self.section(&proposed_title, &pick(PackageOutcome::is_proposed), width, writer)?;
        self.section("Needs review:", &pick(PackageOutcome::is_needs_review), width, writer)?;
        self.section("Failed:", &pick(PackageOutcome::is_failed), width, writer)?;
        self.section("Skipped:", &pick(PackageOutcome::is_skipped), width, writer)?;

        self.format_summary(report, writer)
    }

    fn format_summary(&self, report: &RunReport, writer: &mut dyn Write) -> std::io::Result<()> {
        let prefix = self.dry_run_prefix(report.dry_run);
        let proposed = report.proposed_count();
        let skipped = report.skipped_count();
        let review = report.needs_review_count();
        let failed = report.failed_count();
        let level = report.action_level.cli_name();

        if self.color {
            let failed_display = if failed > 0 {
                failed.to_string().red().bold().to_string()
            } else {
                failed.to_string().dimmed().to_string()
            };
            writeln!(
                writer,
                "{}{} proposed, {} skipped, {} need review, {} failed {}",
                prefix,
                proposed.to_string().green(),
                skipped.to_string().dimmed(),
                review.to_string().yellow(),
                failed_display,
                format!("(action level: {})", level).dimmed()
            )
        } else {
            writeln!(
                writer,
                "{}{} proposed, {} skipped, {} need review, {} failed (action level: {})",
                prefix, proposed, skipped, review, failed, level
            )
        }
    }

    fn format_package(
        &self,
        entry: &PackageReport,
        writer: &mut dyn Write,
    ) -> std::io::Result<()> {
        self.write_line(entry, entry.package.len(), writer)
    }
}
