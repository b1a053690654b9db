//! Failure alerts
//!
//! Files one dated issue when a run fails, linking to the run's log.

use crate::domain::RunReport;
use crate::error::HostingError;
use crate::hosting::Hosting;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

/// Files alert issues on the hosting platform
pub struct AlertSink {
    hosting: Arc<dyn Hosting>,
    run_url: Option<String>,
}

impl AlertSink {
    /// Create an alert sink
    pub fn new(hosting: Arc<dyn Hosting>, run_url: Option<String>) -> Self {
        Self { hosting, run_url }
    }

    /// Alert about a run whose report contains failures
    ///
    /// Returns the issue URL.
    pub async fn notify_failure(&self, report: &RunReport) -> Result<String, HostingError> {
        let date = report.started_at.date_naive();
        let body = failure_body(report, self.run_url.as_deref());
        self.file(date, &body).await
    }

    /// Alert about a run that aborted before producing a report
    pub async fn notify_error(&self, message: &str) -> Result<String, HostingError> {
        let mut body = format!("The run aborted: {}\n", message);
        push_run_link(&mut body, self.run_url.as_deref());
        self.file(Utc::now().date_naive(), &body).await
    }

    async fn file(&self, date: NaiveDate, body: &str) -> Result<String, HostingError> {
        let title = alert_title(date);
        let url = self.hosting.create_issue(&title, body).await?;
        tracing::info!(%title, %url, "alert issue filed");
        Ok(url)
    }
}

/// Title of the alert issue for a run on `date`
pub fn alert_title(date: NaiveDate) -> String {
    format!("Stubsabot run failed on {}", date.format("%Y-%m-%d"))
}

fn push_run_link(body: &mut String, run_url: Option<&str>) {
    match run_url {
        Some(url) => body.push_str(&format!("\nSee the run log: {}\n", url)),
        None => body.push_str("\nNo run log link is available.\n"),
    }
}

fn failure_body(report: &RunReport, run_url: Option<&str>) -> String {
    let mut body = format!(
        "Stubsabot failed on {} of {} package(s) (action level: {}).\n\n",
        report.failed_count(),
        report.packages.len(),
        report.action_level
    );
    for entry in report.failures() {
        body.push_str(&format!("- `{}`: {}\n", entry.package, entry.outcome));
    }
    push_run_link(&mut body, run_url);
    body
}
