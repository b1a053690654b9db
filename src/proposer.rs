//! Change proposals
//!
//! Turns a classified action into a branch, a commit and a pull request,
//! unless the hosting platform already shows a proposal for the same
//! change or another open one for the same package.

use crate::classify::severity;
use crate::domain::{ClassifiedAction, Severity, SkipReason, StubPackage};
use crate::error::{AppError, HostingError, MetadataError};
use crate::hosting::{ExistingProposal, Hosting, ProposalQuery, ProposalState};
use crate::manifest::{render_action, unified_diff};
use serde::Serialize;
use std::sync::Arc;

/// Prefix for every branch the bot creates
pub const BRANCH_PREFIX: &str = "stubsabot";

/// Suffix tried once when the branch name is already taken
const CONFLICT_SUFFIX: &str = "-2";

/// A new file body to commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub contents: String,
}

/// Everything needed to publish one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeProposal {
    pub package: String,
    pub action: ClassifiedAction,
    /// `{stub}:{kind}:{version}`
    pub dedup_key: String,
    pub branch: String,
    pub title: String,
    pub commit_message: String,
    pub body: String,
    pub changes: Vec<FileChange>,
    /// Unified diff of `changes`
    pub diff: String,
    /// Commit to build on; the base branch head when absent
    pub base_commit: Option<String>,
}

impl ChangeProposal {
    /// Build a proposal for a package and a proposable action
    pub fn new(package: &StubPackage, action: &ClassifiedAction) -> Result<Self, MetadataError> {
        let version = action.target_version().ok_or_else(|| MetadataError::RenderError {
            path: package.metadata_path.clone(),
            message: format!("'{}' is not a proposable action", action.kind()),
        })?;

        let rendered = render_action(package, action)?;
        let diff = unified_diff(&package.metadata_path, &package.metadata_source, &rendered);
        let path = package
            .metadata_path
            .to_string_lossy()
            .replace('\\', "/");

        let commit_message = match action {
            ClassifiedAction::MarkObsolete { since } => {
                format!("[stubsabot] Mark {} as obsolete since {}", package.name, since)
            }
            _ => format!("[stubsabot] Bump {} to {}", package.name, version),
        };

        Ok(Self {
            package: package.name.clone(),
            action: action.clone(),
            dedup_key: dedup_key(&package.name, action).unwrap_or_default(),
            branch: branch_name(&package.name, action).unwrap_or_default(),
            title: commit_message.clone(),
            commit_message,
            body: proposal_body(package, action),
            changes: vec![FileChange {
                path,
                contents: rendered,
            }],
            diff,
            base_commit: package.last_known_good.clone(),
        })
    }

    /// Same proposal on a suffixed branch
    pub fn on_branch(&self, branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..self.clone()
        }
    }
}

/// Dedup key of a proposable action
pub fn dedup_key(stub: &str, action: &ClassifiedAction) -> Option<String> {
    let version = action.target_version()?;
    Some(format!("{}:{}:{}", stub, action.kind(), version))
}

/// Branch name of a proposable action
pub fn branch_name(stub: &str, action: &ClassifiedAction) -> Option<String> {
    let version = action.target_version()?;
    Some(format!(
        "{}{}-{}",
        package_branch_prefix(stub),
        action.kind(),
        version
    ))
}

/// Branch tried once when `branch` is already taken
pub fn conflict_branch(branch: &str) -> String {
    format!("{}{}", branch, CONFLICT_SUFFIX)
}

/// Prefix shared by all branches of one stub package
pub fn package_branch_prefix(stub: &str) -> String {
    format!("{}/{}/", BRANCH_PREFIX, stub)
}

fn proposal_body(package: &StubPackage, action: &ClassifiedAction) -> String {
    let tier = match severity(action) {
        Severity::Requires(level) => level.to_string(),
        Severity::Informational => "informational".to_string(),
    };
    let mut body = match action {
        ClassifiedAction::Update { current, target } => format!(
            "Release: https://pypi.org/project/{up}/{target}/\n\nBumps the minimum supported `{up}` version from {current} to {target}.\n",
            up = package.upstream,
        ),
        ClassifiedAction::MarkObsolete { since } => format!(
            "Release: https://pypi.org/project/{up}/{since}/\n\n`{up}` {since} declares `Typing :: Typed` and ships its own type information, so these stubs are marked obsolete.\n",
            up = package.upstream,
        ),
        other => format!("{}\n", other),
    };
    body.push_str(&format!("\nAction level: {}\n", tier));
    if let Some(commit) = &package.last_known_good {
        body.push_str(&format!("Based on: {}\n", commit));
    }
    body
}

/// What happened to a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Published on the hosting platform
    Published { proposal: ChangeProposal, url: String },
    /// Rendered only (dry-run)
    DryRun { proposal: ChangeProposal },
    /// Not proposed because of an existing proposal
    Skipped {
        reason: SkipReason,
        existing: Option<ExistingProposal>,
    },
}

impl ProposalOutcome {
    /// The proposal, if one was built
    pub fn proposal(&self) -> Option<&ChangeProposal> {
        match self {
            ProposalOutcome::Published { proposal, .. } | ProposalOutcome::DryRun { proposal } => {
                Some(proposal)
            }
            ProposalOutcome::Skipped { .. } => None,
        }
    }
}

/// Creates proposals on a hosting platform
#[derive(Clone)]
pub struct ChangeProposer {
    hosting: Arc<dyn Hosting>,
    dry_run: bool,
}

impl ChangeProposer {
    /// Create a proposer
    pub fn new(hosting: Arc<dyn Hosting>, dry_run: bool) -> Self {
        Self { hosting, dry_run }
    }

    /// Propose `action` for `package`
    pub async fn propose(
        &self,
        package: &StubPackage,
        action: &ClassifiedAction,
    ) -> Result<ProposalOutcome, AppError> {
        let branch = branch_name(&package.name, action).ok_or_else(|| {
            MetadataError::RenderError {
                path: package.metadata_path.clone(),
                message: format!("'{}' is not a proposable action", action.kind()),
            }
        })?;

        let query = ProposalQuery {
            branch_prefix: package_branch_prefix(&package.name),
            branch: branch.clone(),
        };
        let existing = self.hosting.find_proposals(&query).await?;
        if let Some((reason, found)) = check_existing(&branch, &existing) {
            tracing::info!(package = %package.name, %branch, reason = %reason, "skipping proposal");
            return Ok(ProposalOutcome::Skipped {
                reason,
                existing: Some(found.clone()),
            });
        }

        let proposal = ChangeProposal::new(package, action)?;

        if self.dry_run {
            tracing::info!(package = %package.name, branch = %proposal.branch, "dry-run: not publishing");
            return Ok(ProposalOutcome::DryRun { proposal });
        }

        match self.hosting.publish(&proposal).await {
            Ok(published) => {
                tracing::info!(package = %package.name, branch = %published.branch, url = %published.url, "proposal published");
                Ok(ProposalOutcome::Published {
                    proposal,
                    url: published.url,
                })
            }
            Err(HostingError::Conflict { branch }) => {
                let retry_branch = conflict_branch(&branch);
                tracing::warn!(package = %package.name, %branch, %retry_branch, "branch exists, retrying once");
                let proposal = proposal.on_branch(retry_branch);
                let published = self.hosting.publish(&proposal).await?;
                Ok(ProposalOutcome::Published {
                    proposal,
                    url: published.url,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// True if `candidate` is `branch` or its conflict-suffixed twin
fn is_same_branch(branch: &str, candidate: &str) -> bool {
    candidate == branch
        || candidate
            .strip_prefix(branch)
            .is_some_and(|rest| rest == CONFLICT_SUFFIX)
}

/// Decide whether existing proposals block this one
fn check_existing<'a>(
    branch: &str,
    existing: &'a [ExistingProposal],
) -> Option<(SkipReason, &'a ExistingProposal)> {
    let same: Vec<&ExistingProposal> = existing
        .iter()
        .filter(|p| is_same_branch(branch, &p.branch))
        .collect();

    for (state, reason) in [
        (ProposalState::Open, SkipReason::Duplicate),
        (ProposalState::Merged, SkipReason::AlreadyMerged),
        (ProposalState::Closed, SkipReason::PreviouslyRejected),
    ] {
        if let Some(found) = same.iter().find(|p| p.state == state) {
            return Some((reason, *found));
        }
    }

    existing
        .iter()
        .find(|p| p.state == ProposalState::Open && !is_same_branch(branch, &p.branch))
        .map(|found| {
            (
                SkipReason::ProposalPending {
                    branch: found.branch.clone(),
                },
                found,
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Version, VersionConstraint};
    use crate::hosting::PublishedProposal;
    use crate::manifest::parse_metadata;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn package() -> StubPackage {
        parse_metadata(
            "foo-stubs",
            Path::new("stubs/foo-stubs/METADATA.toml"),
            "version = \"1.0.0\"\nupstream = \"foo\"\n",
        )
        .unwrap()
    }

    fn existing(branch: &str, state: ProposalState) -> ExistingProposal {
        ExistingProposal {
            number: 1,
            branch: branch.to_string(),
            url: format!("https://example.com/{}", branch),
            state,
        }
    }

    /// In-memory hosting double
    #[derive(Default)]
    struct FakeHosting {
        proposals: Mutex<Vec<ExistingProposal>>,
        taken_branches: Mutex<Vec<String>>,
        published: Mutex<Vec<ChangeProposal>>,
    }

    #[async_trait]
    impl Hosting for FakeHosting {
        async fn find_proposals(
            &self,
            query: &ProposalQuery,
        ) -> Result<Vec<ExistingProposal>, HostingError> {
            Ok(self
                .proposals
                .lock()
                .unwrap()
                .iter()
                .filter(|p| query.matches(&p.branch))
                .cloned()
                .collect())
        }

        async fn publish(
            &self,
            proposal: &ChangeProposal,
        ) -> Result<PublishedProposal, HostingError> {
            let mut taken = self.taken_branches.lock().unwrap();
            if taken.contains(&proposal.branch) {
                return Err(HostingError::Conflict {
                    branch: proposal.branch.clone(),
                });
            }
            taken.push(proposal.branch.clone());
            let mut published = self.published.lock().unwrap();
            published.push(proposal.clone());
            Ok(PublishedProposal {
                number: published.len() as u64,
                branch: proposal.branch.clone(),
                url: format!("https://example.com/pull/{}", published.len()),
            })
        }

        async fn create_issue(&self, _title: &str, _body: &str) -> Result<String, HostingError> {
            Ok("https://example.com/issues/1".to_string())
        }
    }

    #[test]
    fn test_dedup_key_and_branch() {
        let action = ClassifiedAction::update(v("1.0.0"), v("1.1.0"));
        assert_eq!(
            dedup_key("foo-stubs", &action).unwrap(),
            "foo-stubs:bump:1.1.0"
        );
        assert_eq!(
            branch_name("foo-stubs", &action).unwrap(),
            "stubsabot/foo-stubs/bump-1.1.0"
        );
        let obsolete = ClassifiedAction::MarkObsolete { since: v("2.0") };
        assert_eq!(
            branch_name("foo-stubs", &obsolete).unwrap(),
            "stubsabot/foo-stubs/obsolete-2.0"
        );
        assert!(dedup_key("foo", &ClassifiedAction::needs_review("x")).is_none());
    }

    #[test]
    fn test_proposal_contents() {
        let action = ClassifiedAction::update(v("1.0.0"), v("1.1.0"));
        let proposal = ChangeProposal::new(&package(), &action).unwrap();
        assert_eq!(proposal.commit_message, "[stubsabot] Bump foo-stubs to 1.1.0");
        assert_eq!(proposal.title, proposal.commit_message);
        assert_eq!(proposal.changes.len(), 1);
        assert_eq!(proposal.changes[0].path, "stubs/foo-stubs/METADATA.toml");
        assert_eq!(
            proposal.changes[0].contents,
            "version = \"1.1.0\"\nupstream = \"foo\"\n"
        );
        assert!(proposal.diff.contains("-version = \"1.0.0\""));
        assert!(proposal.diff.contains("+version = \"1.1.0\""));
        assert!(proposal.body.contains("Action level: new-releases"));
        assert!(proposal.body.contains("https://pypi.org/project/foo/1.1.0/"));
    }

    #[test]
    fn test_obsolete_commit_message() {
        let action = ClassifiedAction::MarkObsolete { since: v("2.0") };
        let proposal = ChangeProposal::new(&package(), &action).unwrap();
        assert_eq!(
            proposal.commit_message,
            "[stubsabot] Mark foo-stubs as obsolete since 2.0"
        );
        assert!(proposal.changes[0].contents.contains("obsolete_since = \"2.0\""));
    }

    #[test]
    fn test_base_commit_from_package() {
        let mut pkg = package();
        pkg.last_known_good = Some("abc123".to_string());
        let proposal =
            ChangeProposal::new(&pkg, &ClassifiedAction::update(v("1.0.0"), v("1.1.0"))).unwrap();
        assert_eq!(proposal.base_commit.as_deref(), Some("abc123"));
        assert!(proposal.body.contains("Based on: abc123"));
    }

    #[test]
    fn test_check_existing_rules() {
        let branch = "stubsabot/foo/bump-1.1";
        assert!(check_existing(branch, &[]).is_none());

        let open = [existing(branch, ProposalState::Open)];
        assert_eq!(check_existing(branch, &open).unwrap().0, SkipReason::Duplicate);

        let closed = [existing(branch, ProposalState::Closed)];
        assert_eq!(
            check_existing(branch, &closed).unwrap().0,
            SkipReason::PreviouslyRejected
        );

        let merged = [existing(branch, ProposalState::Merged)];
        assert_eq!(
            check_existing(branch, &merged).unwrap().0,
            SkipReason::AlreadyMerged
        );

        let other_open = [existing("stubsabot/foo/bump-1.0.5", ProposalState::Open)];
        assert_eq!(
            check_existing(branch, &other_open).unwrap().0,
            SkipReason::ProposalPending {
                branch: "stubsabot/foo/bump-1.0.5".to_string()
            }
        );

        let other_closed = [existing("stubsabot/foo/bump-1.0.5", ProposalState::Closed)];
        assert!(check_existing(branch, &other_closed).is_none());
    }

    #[test]
    fn test_suffixed_branch_counts_as_same() {
        let branch = "stubsabot/foo/bump-1.1";
        let found = [existing("stubsabot/foo/bump-1.1-2", ProposalState::Open)];
        assert_eq!(check_existing(branch, &found).unwrap().0, SkipReason::Duplicate);
        assert!(!is_same_branch(branch, "stubsabot/foo/bump-1.10"));
    }

    #[tokio::test]
    async fn test_propose_publishes() {
        let hosting = Arc::new(FakeHosting::default());
        let proposer = ChangeProposer::new(hosting.clone(), false);
        let outcome = proposer
            .propose(&package(), &ClassifiedAction::update(v("1.0.0"), v("1.1.0")))
            .await
            .unwrap();
        assert!(matches!(outcome, ProposalOutcome::Published { ref url, .. } if url == "https://example.com/pull/1"));
        assert_eq!(hosting.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_propose_twice_is_duplicate() {
        let hosting = Arc::new(FakeHosting::default());
        let proposer = ChangeProposer::new(hosting.clone(), false);
        let action = ClassifiedAction::update(v("1.0.0"), v("1.1.0"));

        let first = proposer.propose(&package(), &action).await.unwrap();
        let url = match first {
            ProposalOutcome::Published { url, .. } => url,
            other => panic!("expected Published, got {:?}", other),
        };
        hosting.proposals.lock().unwrap().push(ExistingProposal {
            number: 1,
            branch: "stubsabot/foo-stubs/bump-1.1.0".to_string(),
            url,
            state: ProposalState::Open,
        });

        let second = proposer.propose(&package(), &action).await.unwrap();
        assert!(matches!(
            second,
            ProposalOutcome::Skipped {
                reason: SkipReason::Duplicate,
                ..
            }
        ));
        assert_eq!(hosting.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_retries_with_suffix() {
        let hosting = Arc::new(FakeHosting::default());
        hosting
            .taken_branches
            .lock()
            .unwrap()
            .push("stubsabot/foo-stubs/bump-1.1.0".to_string());
        let proposer = ChangeProposer::new(hosting.clone(), false);

        let outcome = proposer
            .propose(&package(), &ClassifiedAction::update(v("1.0.0"), v("1.1.0")))
            .await
            .unwrap();
        let proposal = outcome.proposal().unwrap();
        assert_eq!(proposal.branch, "stubsabot/foo-stubs/bump-1.1.0-2");
    }

    #[tokio::test]
    async fn test_second_conflict_fails() {
        let hosting = Arc::new(FakeHosting::default());
        {
            let mut taken = hosting.taken_branches.lock().unwrap();
            taken.push("stubsabot/foo-stubs/bump-1.1.0".to_string());
            taken.push("stubsabot/foo-stubs/bump-1.1.0-2".to_string());
        }
        let proposer = ChangeProposer::new(hosting.clone(), false);

        let err = proposer
            .propose(&package(), &ClassifiedAction::update(v("1.0.0"), v("1.1.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Hosting(HostingError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_publish() {
        let hosting = Arc::new(FakeHosting::default());
        let proposer = ChangeProposer::new(hosting.clone(), true);

        let outcome = proposer
            .propose(&package(), &ClassifiedAction::update(v("1.0.0"), v("1.1.0")))
            .await
            .unwrap();
        assert!(matches!(outcome, ProposalOutcome::DryRun { .. }));
        assert!(hosting.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_proposable_action_is_error() {
        let proposer = ChangeProposer::new(Arc::new(FakeHosting::default()), false);
        let err = proposer
            .propose(&package(), &ClassifiedAction::needs_review("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Metadata(MetadataError::RenderError { .. })));
    }

    #[test]
    fn test_wildcard_constraint_proposal() {
        let pkg = StubPackage::new("bar", "bar", VersionConstraint::parse("1.2.*").unwrap())
            .with_metadata_source("version = \"1.2.*\"\n");
        let proposal =
            ChangeProposal::new(&pkg, &ClassifiedAction::update(v("1.2"), v("1.3.1"))).unwrap();
        assert_eq!(proposal.changes[0].contents, "version = \"1.3.*\"\n");
        assert_eq!(proposal.branch, "stubsabot/bar/bump-1.3.1");
    }
}
