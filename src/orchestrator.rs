//! Run orchestrator coordinating one stubsabot run
//!
//! This module provides:
//! - Workflow coordination: list → fetch → classify → propose
//! - Parallel package processing bounded by a semaphore
//! - Per-package isolation: any failure becomes a `Failed` entry
//! - Results reassembled in registry order

use crate::classify::{latest_release, ActionClassifier, RunFilter};
use crate::config::{RunConfig, Settings};
use crate::domain::{
    ClassifiedAction, PackageOutcome, PackageReport, RunReport, SkipReason, StubPackage,
};
use crate::error::{ConfigError, MetadataError};
use crate::hosting::Hosting;
use crate::manifest::StubRegistry;
use crate::progress::Progress;
use crate::proposer::{ChangeProposer, ProposalOutcome};
use crate::registry::{HttpClient, PyPIAdapter, ReleaseSource};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Orchestrator for one run
pub struct Orchestrator {
    registry: StubRegistry,
    worker: PackageWorker,
    config: RunConfig,
}

/// Everything a package task needs; cheap to clone into tasks
#[derive(Clone)]
struct PackageWorker {
    source: Arc<dyn ReleaseSource>,
    proposer: ChangeProposer,
    filter: RunFilter,
    classifier: ActionClassifier,
}

impl Orchestrator {
    /// Create an orchestrator from its collaborators
    pub fn new(
        registry: StubRegistry,
        source: Arc<dyn ReleaseSource>,
        hosting: Arc<dyn Hosting>,
        config: RunConfig,
    ) -> Self {
        let worker = PackageWorker {
            source,
            proposer: ChangeProposer::new(hosting, config.dry_run),
            filter: config.filter(),
            classifier: ActionClassifier::new(),
        };
        Self {
            registry,
            worker,
            config,
        }
    }

    /// Create an orchestrator against the configured package index
    pub fn from_settings(settings: &Settings, hosting: Arc<dyn Hosting>) -> Result<Self, ConfigError> {
        let client = HttpClient::new()?;
        let source = Arc::new(PyPIAdapter::with_base_url(client, &settings.index_url));
        let registry = StubRegistry::new(&settings.repo_root)
            .with_last_known_good(settings.base_commit.clone());
        Ok(Self::new(registry, source, hosting, settings.run.clone()))
    }

    /// Run over every package in the registry
    ///
    /// Unreadable metadata aborts the run before any package is processed.
    pub async fn run(&self) -> Result<RunReport, MetadataError> {
        let mut progress = Progress::new(self.config.show_progress);
        progress.spinner("Loading stub packages...");
        let packages = self.registry.list_packages();
        progress.finish_and_clear();

        let packages = packages?;
        tracing::info!(
            count = packages.len(),
            action_level = %self.config.action_level,
            dry_run = self.config.dry_run,
            "starting run"
        );
        Ok(self.run_packages(packages).await)
    }

    /// Process the given packages and build the report
    pub async fn run_packages(&self, packages: Vec<StubPackage>) -> RunReport {
        let mut report = RunReport::new(self.config.action_level, self.config.dry_run);
        let mut progress = Progress::new(self.config.show_progress);
        progress.start(packages.len() as u64, "Checking stub packages");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut slots: Vec<Option<PackageReport>> = vec![None; packages.len()];
        let mut placeholders = Vec::with_capacity(packages.len());

        for (index, package) in packages.into_iter().enumerate() {
            placeholders.push(empty_entry(&package));

            if !self.worker.filter.should_process_package(&package.name) {
                slots[index] = Some(empty_entry(&package).with_outcome(PackageOutcome::Skipped {
                    action: None,
                    reason: SkipReason::Filtered,
                }));
                progress.package_done(&package.name);
                continue;
            }

            let worker = self.worker.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let fallback = empty_entry(&package);
                let entry = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        // Inner task so a panic is reported against this package
                        match tokio::spawn(worker.process(package)).await {
                            Ok(entry) => entry,
                            Err(e) => fallback
                                .with_outcome(PackageOutcome::failed(format!("task failed: {}", e))),
                        }
                    }
                    Err(_) => fallback.with_outcome(PackageOutcome::failed("worker pool closed")),
                };
                (index, entry)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, entry)) => {
                    progress.package_done(&entry.package);
                    slots[index] = Some(entry);
                }
                Err(e) => tracing::error!(error = %e, "package task aborted"),
            }
        }
        progress.finish_and_clear();

        for (slot, placeholder) in slots.into_iter().zip(placeholders) {
            let entry = slot.unwrap_or_else(|| {
                placeholder.with_outcome(PackageOutcome::failed("package task aborted"))
            });
            report.add(entry);
        }
        report.finish();

        tracing::info!(
            proposed = report.proposed_count(),
            skipped = report.skipped_count(),
            needs_review = report.needs_review_count(),
            failed = report.failed_count(),
            "run finished"
        );
        report
    }
}

impl PackageWorker {
    async fn process(self, package: StubPackage) -> PackageReport {
        let span = tracing::info_span!("package", package = %package.name, upstream = %package.upstream);
        async move {
            let entry = empty_entry(&package);

            let releases = match self.source.fetch_releases(&package.upstream).await {
                Ok(releases) => releases,
                Err(e) => {
                    tracing::warn!(error = %e, "fetching releases failed");
                    return entry.with_outcome(PackageOutcome::failed(e));
                }
            };
            let entry = entry.with_latest(
                latest_release(&releases, package.prerelease).map(|r| r.version.clone()),
            );

            let action = self.classifier.classify(&package, &releases);
            tracing::debug!(%action, "classified");

            match &action {
                ClassifiedAction::NoAction { reason } => {
                    let reason = SkipReason::NoAction(reason.clone());
                    entry.with_outcome(PackageOutcome::skipped(action.clone(), reason))
                }
                ClassifiedAction::NeedsReview { reason } => {
                    tracing::info!(%reason, "needs review");
                    entry.with_outcome(PackageOutcome::NeedsReview {
                        reason: reason.clone(),
                    })
                }
                _ if !self.filter.permits(&action) => {
                    tracing::info!(%action, "below action level");
                    entry.with_outcome(PackageOutcome::skipped(
                        action.clone(),
                        SkipReason::BelowActionLevel,
                    ))
                }
                _ => self.propose(&package, action.clone(), entry).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn propose(
        &self,
        package: &StubPackage,
        action: ClassifiedAction,
        entry: PackageReport,
    ) -> PackageReport {
        match self.proposer.propose(package, &action).await {
            Ok(ProposalOutcome::Published { proposal, url }) => entry
                .with_diff(proposal.diff)
                .with_outcome(PackageOutcome::Proposed {
                    action,
                    branch: proposal.branch,
                    url: Some(url),
                }),
            Ok(ProposalOutcome::DryRun { proposal }) => entry
                .with_diff(proposal.diff)
                .with_outcome(PackageOutcome::Proposed {
                    action,
                    branch: proposal.branch,
                    url: None,
                }),
            Ok(ProposalOutcome::Skipped { reason, .. }) => {
                entry.with_outcome(PackageOutcome::skipped(action, reason))
            }
            Err(e) => {
                tracing::warn!(error = %e, "proposal failed");
                entry.with_outcome(PackageOutcome::failed(e))
            }
        }
    }
}

/// Report entry for a package before its outcome is known
fn empty_entry(package: &StubPackage) -> PackageReport {
    PackageReport::new(
        &package.name,
        &package.upstream,
        &package.min_version.raw,
        PackageOutcome::failed("not processed"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::UpstreamRelease;
    use crate::domain::{ActionLevel, VersionConstraint};
    use crate::error::{HostingError, RegistryError};
    use crate::hosting::{ExistingProposal, ProposalQuery, PublishedProposal};
    use crate::proposer::ChangeProposal;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Releases keyed by upstream name; `None` means the index is down
    #[derive(Default)]
    struct FakeSource {
        releases: HashMap<String, Option<Vec<&'static str>>>,
    }

    impl FakeSource {
        fn with(mut self, upstream: &str, versions: Option<Vec<&'static str>>) -> Self {
            self.releases.insert(upstream.to_string(), versions);
            self
        }
    }

    #[async_trait]
    impl ReleaseSource for FakeSource {
        fn registry_name(&self) -> &'static str {
            "fake"
        }

        async fn fetch_releases(&self, package: &str) -> Result<Vec<UpstreamRelease>, RegistryError> {
            match self.releases.get(package) {
                Some(Some(versions)) => Ok(versions
                    .iter()
                    .map(|v| UpstreamRelease::parse(v).unwrap())
                    .collect()),
                Some(None) => Err(RegistryError::SourceUnavailable {
                    package: package.to_string(),
                    registry: "fake".to_string(),
                    attempts: 4,
                    message: "connection refused".to_string(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    #[derive(Default)]
    struct FakeHosting {
        published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Hosting for FakeHosting {
        async fn find_proposals(
            &self,
            _query: &ProposalQuery,
        ) -> Result<Vec<ExistingProposal>, HostingError> {
            Ok(Vec::new())
        }

        async fn publish(&self, proposal: &ChangeProposal) -> Result<PublishedProposal, HostingError> {
            let mut published = self.published.lock().unwrap();
            published.push(proposal.branch.clone());
            Ok(PublishedProposal {
                number: published.len() as u64,
                branch: proposal.branch.clone(),
                url: format!("https://example.com/pull/{}", published.len()),
            })
        }

        async fn create_issue(&self, _title: &str, _body: &str) -> Result<String, HostingError> {
            Ok(String::new())
        }
    }

    fn package(name: &str, min: &str) -> StubPackage {
        StubPackage::new(name, name, VersionConstraint::parse(min).unwrap())
            .with_metadata_source(format!("version = \"{}\"\n", min))
    }

    fn orchestrator(source: FakeSource, hosting: Arc<FakeHosting>, config: RunConfig) -> Orchestrator {
        let dir = std::env::temp_dir();
        Orchestrator::new(StubRegistry::new(dir), Arc::new(source), hosting, config)
    }

    #[tokio::test]
    async fn test_minor_update_is_proposed() {
        let hosting = Arc::new(FakeHosting::default());
        let source = FakeSource::default().with("foo", Some(vec!["1.0.0", "1.1.0"]));
        let orch = orchestrator(source, hosting.clone(), RunConfig::default());

        let report = orch.run_packages(vec![package("foo", "1.0.0")]).await;
        assert!(report.is_success());
        assert_eq!(report.proposed_count(), 1);
        let entry = report.get("foo").unwrap();
        assert!(matches!(entry.outcome, PackageOutcome::Proposed { url: Some(_), .. }));
        assert!(entry.diff.as_deref().unwrap().contains("+version = \"1.1.0\""));
        assert_eq!(hosting.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_below_action_level() {
        let hosting = Arc::new(FakeHosting::default());
        let source = FakeSource::default().with("foo", Some(vec!["1.0.0", "1.1.0"]));
        let config = RunConfig {
            action_level: ActionLevel::ObsoleteOnly,
            ..RunConfig::default()
        };
        let report = orchestrator(source, hosting.clone(), config)
            .run_packages(vec![package("foo", "1.0.0")])
            .await;

        assert!(report.is_success());
        assert!(matches!(
            report.get("foo").unwrap().outcome,
            PackageOutcome::Skipped {
                reason: SkipReason::BelowActionLevel,
                ..
            }
        ));
        assert!(hosting.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_order_kept() {
        let hosting = Arc::new(FakeHosting::default());
        let source = FakeSource::default()
            .with("a", Some(vec!["1.0", "1.1"]))
            .with("b", None)
            .with("c", Some(vec!["2.0", "2.1"]));
        let config = RunConfig {
            concurrency: 2,
            ..RunConfig::default()
        };
        let report = orchestrator(source, hosting, config)
            .run_packages(vec![package("a", "1.0"), package("b", "1.0"), package("c", "2.0")])
            .await;

        let names: Vec<&str> = report.packages.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(report.get("a").unwrap().outcome.is_proposed());
        assert!(report.get("b").unwrap().outcome.is_failed());
        assert!(report.get("c").unwrap().outcome.is_proposed());
        assert!(!report.is_success());
    }

    #[tokio::test]
    async fn test_vanished_upstream_needs_review() {
        let hosting = Arc::new(FakeHosting::default());
        let report = orchestrator(FakeSource::default(), hosting, RunConfig::default())
            .run_packages(vec![package("gone", "1.0")])
            .await;
        assert!(report.get("gone").unwrap().outcome.is_needs_review());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_filtered_packages_are_skipped() {
        let hosting = Arc::new(FakeHosting::default());
        let source = FakeSource::default()
            .with("a", Some(vec!["1.1"]))
            .with("b", Some(vec!["1.1"]));
        let config = RunConfig {
            exclude: vec!["b".to_string()],
            ..RunConfig::default()
        };
        let report = orchestrator(source, hosting.clone(), config)
            .run_packages(vec![package("a", "1.0"), package("b", "1.0")])
            .await;
        assert!(matches!(
            report.get("b").unwrap().outcome,
            PackageOutcome::Skipped {
                reason: SkipReason::Filtered,
                ..
            }
        ));
        assert_eq!(hosting.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_publishing() {
        let hosting = Arc::new(FakeHosting::default());
        let source = FakeSource::default().with("foo", Some(vec!["1.1"]));
        let config = RunConfig {
            dry_run: true,
            ..RunConfig::default()
        };
        let report = orchestrator(source, hosting.clone(), config)
            .run_packages(vec![package("foo", "1.0")])
            .await;
        assert!(report.dry_run);
        assert!(matches!(
            report.get("foo").unwrap().outcome,
            PackageOutcome::Proposed { url: None, .. }
        ));
        assert!(hosting.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_reads_registry() {
        let dir = TempDir::new().unwrap();
        let stub_dir = dir.path().join("stubs").join("foo");
        std::fs::create_dir_all(&stub_dir).unwrap();
        std::fs::write(stub_dir.join("METADATA.toml"), "version = \"1.0\"\n").unwrap();

        let source = FakeSource::default().with("foo", Some(vec!["1.0"]));
        let orch = Orchestrator::new(
            StubRegistry::new(dir.path()),
            Arc::new(source),
            Arc::new(FakeHosting::default()),
            RunConfig::default(),
        );
        let report = orch.run().await.unwrap();
        assert_eq!(report.packages.len(), 1);
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_run_with_bad_metadata_is_fatal() {
        let dir = TempDir::new().unwrap();
        let stub_dir = dir.path().join("stubs").join("foo");
        std::fs::create_dir_all(&stub_dir).unwrap();
        std::fs::write(stub_dir.join("METADATA.toml"), "version = \"?\"\n").unwrap();

        let orch = Orchestrator::new(
            StubRegistry::new(dir.path()),
            Arc::new(FakeSource::default()),
            Arc::new(FakeHosting::default()),
            RunConfig::default(),
        );
        assert!(orch.run().await.is_err());
    }
}
