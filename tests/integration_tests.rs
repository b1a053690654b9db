//! Integration tests for stubsabot
//!
//! These tests drive whole runs through the public API:
//! - A stub registry on disk (tempfile)
//! - PyPI JSON documents parsed by the real adapter code
//! - An in-memory hosting platform that remembers proposals

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use stubsabot::classify::UpstreamRelease;
use stubsabot::config::RunConfig;
use stubsabot::domain::{ActionLevel, ClassifiedAction, PackageOutcome, RunReport, SkipReason};
use stubsabot::error::{HostingError, RegistryError};
use stubsabot::hosting::{
    ExistingProposal, Hosting, ProposalQuery, ProposalState, PublishedProposal,
};
use stubsabot::manifest::StubRegistry;
use stubsabot::orchestrator::Orchestrator;
use stubsabot::proposer::ChangeProposal;
use stubsabot::registry::{parse_releases, ReleaseSource};
use tempfile::TempDir;

/// Build a PyPI JSON document with one file per release
fn pypi_json(latest: &str, typed: bool, versions: &[&str]) -> String {
    let classifiers = if typed {
        r#"["Programming Language :: Python", "Typing :: Typed"]"#
    } else {
        r#"["Programming Language :: Python"]"#
    };
    let releases: Vec<String> = versions
        .iter()
        .map(|v| {
            format!(
                r#""{}": [{{"upload_time_iso_8601": "2024-01-01T00:00:00.000000Z", "yanked": false}}]"#,
                v
            )
        })
        .collect();
    format!(
        r#"{{"info": {{"version": "{}", "classifiers": {}}}, "releases": {{{}}}}}"#,
        latest,
        classifiers,
        releases.join(", ")
    )
}

/// Package index serving canned PyPI documents
#[derive(Default)]
struct FakeIndex {
    documents: HashMap<String, String>,
    broken: Vec<String>,
}

impl FakeIndex {
    fn serve(mut self, package: &str, document: String) -> Self {
        self.documents.insert(package.to_string(), document);
        self
    }

    fn broken(mut self, package: &str) -> Self {
        self.broken.push(package.to_string());
        self
    }
}

#[async_trait]
impl ReleaseSource for FakeIndex {
    fn registry_name(&self) -> &'static str {
        "PyPI"
    }

    async fn fetch_releases(&self, package: &str) -> Result<Vec<UpstreamRelease>, RegistryError> {
        if self.broken.iter().any(|p| p == package) {
            return Err(RegistryError::SourceUnavailable {
                package: package.to_string(),
                registry: "PyPI".to_string(),
                attempts: 4,
                message: "HTTP 503".to_string(),
            });
        }
        match self.documents.get(package) {
            Some(body) => Ok(parse_releases(body, package)?
                .into_iter()
                .filter(|r| !r.yanked)
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}

/// Hosting platform that keeps published proposals open
#[derive(Default)]
struct FakeGitHub {
    proposals: Mutex<Vec<ExistingProposal>>,
    published: Mutex<Vec<ChangeProposal>>,
}

impl FakeGitHub {
    fn with_proposal(self, branch: &str, state: ProposalState) -> Self {
        self.proposals.lock().unwrap().push(ExistingProposal {
            number: 100,
            branch: branch.to_string(),
            url: format!("https://github.com/octo/stubs/pull/100#{}", branch),
            state,
        });
        self
    }

    fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl Hosting for FakeGitHub {
    async fn find_proposals(
        &self,
        query: &ProposalQuery,
    ) -> Result<Vec<ExistingProposal>, HostingError> {
        Ok(self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .filter(|p| query.matches(&p.branch) || p.branch == query.branch)
            .cloned()
            .collect())
    }

    async fn publish(&self, proposal: &ChangeProposal) -> Result<PublishedProposal, HostingError> {
        let mut proposals = self.proposals.lock().unwrap();
        if proposals.iter().any(|p| p.branch == proposal.branch) {
            return Err(HostingError::Conflict {
                branch: proposal.branch.clone(),
            });
        }
        let number = proposals.len() as u64 + 1;
        let url = format!("https://github.com/octo/stubs/pull/{}", number);
        proposals.push(ExistingProposal {
            number,
            branch: proposal.branch.clone(),
            url: url.clone(),
            state: ProposalState::Open,
        });
        self.published.lock().unwrap().push(proposal.clone());
        Ok(PublishedProposal {
            number,
            branch: proposal.branch.clone(),
            url,
        })
    }

    async fn create_issue(&self, _title: &str, _body: &str) -> Result<String, HostingError> {
        Ok("https://github.com/octo/stubs/issues/1".to_string())
    }
}

/// Checkout with the given `stubs/<name>/METADATA.toml` files
fn create_registry(stubs: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, metadata) in stubs {
        let stub_dir = dir.path().join("stubs").join(name);
        fs::create_dir_all(&stub_dir).unwrap();
        fs::write(stub_dir.join("METADATA.toml"), metadata).unwrap();
    }
    dir
}

fn config(action_level: ActionLevel) -> RunConfig {
    RunConfig {
        action_level,
        ..RunConfig::default()
    }
}

async fn run(
    dir: &TempDir,
    index: FakeIndex,
    hosting: Arc<FakeGitHub>,
    config: RunConfig,
) -> RunReport {
    Orchestrator::new(StubRegistry::new(dir.path()), Arc::new(index), hosting, config)
        .run()
        .await
        .unwrap()
}

fn skip_reason(report: &RunReport, package: &str) -> Option<SkipReason> {
    match &report.get(package)?.outcome {
        PackageOutcome::Skipped { reason, .. } => Some(reason.clone()),
        _ => None,
    }
}

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn test_minor_release_is_proposed_at_everything() {
        let dir = create_registry(&[("requests", "version = \"2.31\"\n")]);
        let index = FakeIndex::default().serve("requests", pypi_json("2.32", false, &["2.31", "2.32"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(report.is_success());
        let entry = report.get("requests").unwrap();
        match &entry.outcome {
            PackageOutcome::Proposed { branch, url, .. } => {
                assert_eq!(branch, "stubsabot/requests/bump-2.32");
                assert!(url.as_deref().unwrap().contains("/pull/"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(entry.latest.as_ref().unwrap().to_string(), "2.32");

        let published = hosting.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].changes[0].path, "stubs/requests/METADATA.toml");
        assert_eq!(published[0].changes[0].contents, "version = \"2.32\"\n");
    }

    #[tokio::test]
    async fn test_minor_release_below_obsolete_only() {
        let dir = create_registry(&[("requests", "version = \"2.31\"\n")]);
        let index = FakeIndex::default().serve("requests", pypi_json("2.32", false, &["2.31", "2.32"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::ObsoleteOnly)).await;

        assert!(report.is_success());
        assert_eq!(
            skip_reason(&report, "requests"),
            Some(SkipReason::BelowActionLevel)
        );
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_major_release_needs_everything() {
        let dir = create_registry(&[("attrs", "version = \"22.1\"\n")]);
        let document = pypi_json("23.1", false, &["22.1", "23.1"]);
        let hosting = Arc::new(FakeGitHub::default());

        let index = FakeIndex::default().serve("attrs", document.clone());
        let report = run(&dir, index, hosting.clone(), config(ActionLevel::NewReleases)).await;
        assert_eq!(skip_reason(&report, "attrs"), Some(SkipReason::BelowActionLevel));

        let index = FakeIndex::default().serve("attrs", document);
        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;
        assert!(report.get("attrs").unwrap().outcome.is_proposed());
        assert_eq!(hosting.published_count(), 1);
    }

    #[tokio::test]
    async fn test_vanished_upstream_needs_review() {
        let dir = create_registry(&[("gone", "version = \"1.0\"\n")]);
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, FakeIndex::default(), hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(report.is_success());
        assert_eq!(
            report.get("gone").unwrap().outcome,
            PackageOutcome::NeedsReview {
                reason: "upstream distribution vanished".to_string()
            }
        );
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_package_does_not_stop_others() {
        let dir = create_registry(&[
            ("alpha", "version = \"1.0\"\n"),
            ("beta", "version = \"1.0\"\n"),
            ("gamma", "version = \"1.0\"\n"),
        ]);
        let index = FakeIndex::default()
            .serve("alpha", pypi_json("1.1", false, &["1.0", "1.1"]))
            .broken("beta")
            .serve("gamma", pypi_json("1.2", false, &["1.0", "1.2"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(!report.is_success());
        assert_eq!(report.failed_count(), 1);
        assert!(report.get("alpha").unwrap().outcome.is_proposed());
        assert!(report.get("gamma").unwrap().outcome.is_proposed());
        match &report.get("beta").unwrap().outcome {
            PackageOutcome::Failed { error } => assert!(error.contains("HTTP 503")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        let names: Vec<&str> = report.packages.iter().map(|p| p.package.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(hosting.published_count(), 2);
    }
}

mod proposals {
    use super::*;

    #[tokio::test]
    async fn test_second_run_is_deduplicated() {
        let dir = create_registry(&[("requests", "version = \"2.31\"\n")]);
        let document = pypi_json("2.32", false, &["2.31", "2.32"]);
        let hosting = Arc::new(FakeGitHub::default());

        let first = run(
            &dir,
            FakeIndex::default().serve("requests", document.clone()),
            hosting.clone(),
            config(ActionLevel::Everything),
        )
        .await;
        assert!(first.get("requests").unwrap().outcome.is_proposed());

        let second = run(
            &dir,
            FakeIndex::default().serve("requests", document),
            hosting.clone(),
            config(ActionLevel::Everything),
        )
        .await;
        assert!(second.is_success());
        assert_eq!(skip_reason(&second, "requests"), Some(SkipReason::Duplicate));
        assert_eq!(hosting.published_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_proposal_is_not_reopened() {
        let dir = create_registry(&[("requests", "version = \"2.31\"\n")]);
        let index = FakeIndex::default().serve("requests", pypi_json("2.32", false, &["2.31", "2.32"]));
        let hosting = Arc::new(
            FakeGitHub::default().with_proposal("stubsabot/requests/bump-2.32", ProposalState::Closed),
        );

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert_eq!(
            skip_reason(&report, "requests"),
            Some(SkipReason::PreviouslyRejected)
        );
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_older_open_proposal_blocks_new_one() {
        let dir = create_registry(&[("requests", "version = \"2.31\"\n")]);
        let index = FakeIndex::default().serve("requests", pypi_json("2.33", false, &["2.31", "2.33"]));
        let hosting = Arc::new(
            FakeGitHub::default().with_proposal("stubsabot/requests/bump-2.32", ProposalState::Open),
        );

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert_eq!(
            skip_reason(&report, "requests"),
            Some(SkipReason::ProposalPending {
                branch: "stubsabot/requests/bump-2.32".to_string()
            })
        );
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_renders_without_publishing() {
        let dir = create_registry(&[("requests", "version = \"2.31\"  # minimum\n")]);
        let index = FakeIndex::default().serve("requests", pypi_json("2.32", false, &["2.31", "2.32"]));
        let hosting = Arc::new(FakeGitHub::default());
        let config = RunConfig {
            dry_run: true,
            ..RunConfig::default()
        };

        let report = run(&dir, index, hosting.clone(), config).await;

        let entry = report.get("requests").unwrap();
        assert!(matches!(entry.outcome, PackageOutcome::Proposed { url: None, .. }));
        let diff = entry.diff.as_deref().unwrap();
        assert!(diff.contains("-version = \"2.31\"  # minimum"));
        assert!(diff.contains("+version = \"2.32\"  # minimum"));
        assert_eq!(hosting.published_count(), 0);

        let on_disk = fs::read_to_string(dir.path().join("stubs/requests/METADATA.toml")).unwrap();
        assert_eq!(on_disk, "version = \"2.31\"  # minimum\n");
    }
}

mod classification {
    use super::*;

    #[tokio::test]
    async fn test_wildcard_constraint_does_not_churn() {
        let dir = create_registry(&[("six", "version = \"1.16.*\"\n")]);
        let index = FakeIndex::default().serve("six", pypi_json("1.16.3", false, &["1.16.0", "1.16.3"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(matches!(
            skip_reason(&report, "six"),
            Some(SkipReason::NoAction(_))
        ));
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_wildcard_constraint_keeps_precision() {
        let dir = create_registry(&[("six", "version = \"1.16.*\"\n")]);
        let index = FakeIndex::default().serve("six", pypi_json("1.17.1", false, &["1.16.0", "1.17.1"]));
        let hosting = Arc::new(FakeGitHub::default());

        run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        let published = hosting.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].changes[0].contents, "version = \"1.17.*\"\n");
    }

    #[tokio::test]
    async fn test_typed_upstream_marks_obsolete() {
        let dir = create_registry(&[("attrs", "version = \"22.1\"\n")]);
        let index = FakeIndex::default().serve("attrs", pypi_json("23.1", true, &["22.1", "23.1"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        match &report.get("attrs").unwrap().outcome {
            PackageOutcome::Proposed { action, branch, .. } => {
                assert!(matches!(action, ClassifiedAction::MarkObsolete { .. }));
                assert_eq!(branch, "stubsabot/attrs/obsolete-23.1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let published = hosting.published.lock().unwrap();
        assert!(published[0].changes[0]
            .contents
            .contains("obsolete_since = \"23.1\""));
    }

    #[tokio::test]
    async fn test_obsolete_package_is_left_alone() {
        let dir = create_registry(&[(
            "attrs",
            "version = \"22.1\"\nobsolete_since = \"23.1\"\n",
        )]);
        let index = FakeIndex::default().serve("attrs", pypi_json("24.1", true, &["22.1", "23.1", "24.1"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(matches!(
            skip_reason(&report, "attrs"),
            Some(SkipReason::NoAction(_))
        ));
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_upper_bound_needs_review() {
        let dir = create_registry(&[("flask", "version = \"2.3\"\nmax_version = \"3.0\"\n")]);
        let index = FakeIndex::default().serve("flask", pypi_json("3.0.1", false, &["2.3", "3.0.1"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(report.is_success());
        assert!(report.get("flask").unwrap().outcome.is_needs_review());
        assert_eq!(hosting.published_count(), 0);
    }

    #[tokio::test]
    async fn test_prereleases_are_ignored_by_default() {
        let dir = create_registry(&[("numpy", "version = \"1.26\"\n")]);
        let index = FakeIndex::default().serve("numpy", pypi_json("2.0.0rc1", false, &["1.26", "2.0.0rc1"]));
        let hosting = Arc::new(FakeGitHub::default());

        let report = run(&dir, index, hosting.clone(), config(ActionLevel::Everything)).await;

        assert!(matches!(
            skip_reason(&report, "numpy"),
            Some(SkipReason::NoAction(_))
        ));
    }
}
