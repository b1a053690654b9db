//! stubsabot - keeps type-stub packages in sync with their upstream releases
//!
//! Exit codes:
//! - 0: every package was processed
//! - 1: at least one package failed
//! - 2: fatal configuration or metadata error

use anyhow::Context;
use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use stubsabot::alert::AlertSink;
use stubsabot::cli::CliArgs;
use stubsabot::config::Settings;
use stubsabot::hosting::{GitHubClient, Hosting};
use stubsabot::logging;
use stubsabot::orchestrator::Orchestrator;
use stubsabot::output::{create_formatter, OutputConfig};

/// Exit code for a run where some package failed
const EXIT_RUN_FAILED: u8 = 1;

/// Exit code for a run that could not start
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    logging::init(args.verbose, args.quiet);

    match run(args).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Main application logic
async fn run(args: CliArgs) -> anyhow::Result<ExitCode> {
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        root = %args.repo_root.display(),
        dry_run = args.dry_run,
        "stubsabot starting"
    );

    let settings = Settings::from_args(&args)?;
    let hosting: Arc<dyn Hosting> = Arc::new(GitHubClient::new(settings.github.clone())?);

    // Alerts are mutations too; a dry run never files one
    let alerts = (settings.alert_on_failure && !settings.run.dry_run)
        .then(|| AlertSink::new(hosting.clone(), settings.run_url.clone()));

    let orchestrator = Orchestrator::from_settings(&settings, hosting)?;
    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(e) => {
            if let Some(sink) = &alerts {
                if let Err(alert_err) = sink.notify_error(&e.to_string()).await {
                    tracing::error!(error = %alert_err, "could not file alert issue");
                }
            }
            return Err(e).context("loading stub metadata");
        }
    };

    {
        let formatter = create_formatter(OutputConfig::from_cli(&args));
        let mut stdout = io::stdout().lock();
        formatter.format(&report, &mut stdout)?;
        stdout.flush()?;
    }

    if report.is_success() {
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(sink) = &alerts {
        match sink.notify_failure(&report).await {
            Ok(url) => eprintln!("Filed alert: {}", url),
            Err(e) => tracing::error!(error = %e, "could not file alert issue"),
        }
    }
    Ok(ExitCode::from(EXIT_RUN_FAILED))
}
