//! GitHub REST API client
//!
//! Publishing goes through the git data API so that a proposal lands as
//! one commit on a fresh branch, followed by the pull request. If the pull
//! request cannot be opened the branch is deleted again.
//!
//! Only GET and DELETE requests are retried. A POST that fails after the
//! server acted on it is reconciled by reading the branch or pull request
//! back instead of sending it again.

use crate::config::GitHubConfig;
use crate::error::HostingError;
use crate::hosting::{ExistingProposal, Hosting, ProposalQuery, ProposalState, PublishedProposal};
use crate::proposer::{conflict_branch, ChangeProposal};
use crate::registry::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::retry::{self, RetryPolicy};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Public GitHub API
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size for list endpoints
const PER_PAGE: u32 = 100;

/// Upper bound on pages fetched when listing open pull requests
const MAX_PAGES: u32 = 10;

/// GitHub client implementing [`Hosting`]
#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubConfig,
    policy: RetryPolicy,
    /// Open pull requests, fetched once per client
    open_pulls: Arc<OnceCell<Vec<ExistingProposal>>>,
}

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
    html_url: String,
    state: String,
    merged_at: Option<String>,
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    branch: String,
}

impl From<PullRequest> for ExistingProposal {
    fn from(pr: PullRequest) -> Self {
        let state = if pr.merged_at.is_some() {
            ProposalState::Merged
        } else if pr.state == "open" {
            ProposalState::Open
        } else {
            ProposalState::Closed
        };
        ExistingProposal {
            number: pr.number,
            branch: pr.head.branch,
            url: pr.html_url,
            state,
        }
    }
}

impl GitHubClient {
    /// Create a client for the configured repository
    pub fn new(config: GitHubConfig) -> Result<Self, HostingError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
            HostingError::InvalidResponse {
                operation: "client setup".to_string(),
                message: "token contains invalid header characters".to_string(),
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| HostingError::NetworkError {
                operation: "client setup".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            policy: RetryPolicy::default(),
            open_pulls: Arc::new(OnceCell::new()),
        })
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.repository,
            path
        )
    }

    /// Send a request, retrying idempotent methods on transient failures
    async fn call(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, HostingError> {
        if method != Method::GET && method != Method::DELETE {
            return self.call_once(operation, method, url, body).await;
        }
        retry::retry(self.policy, HostingError::is_transient, || {
            self.call_once(operation, method.clone(), url, body)
        })
        .await
        .map_err(|failure| failure.error)
    }

    async fn call_once(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, HostingError> {
        tracing::debug!(%method, url, operation, "hosting request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let network = |e: reqwest::Error| {
            if e.is_timeout() {
                HostingError::Timeout {
                    operation: operation.to_string(),
                }
            } else {
                HostingError::NetworkError {
                    operation: operation.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let text = response.text().await.map_err(network)?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| HostingError::InvalidResponse {
                operation: operation.to_string(),
                message: e.to_string(),
            });
        }

        Err(classify_failure(operation, status, &text))
    }

    async fn call_as<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T, HostingError> {
        let value = self.call(operation, method, url, body).await?;
        serde_json::from_value(value).map_err(|e| HostingError::InvalidResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    async fn list_pulls(&self, state: &str, head: Option<&str>) -> Result<Vec<PullRequest>, HostingError> {
        let mut pulls = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut url = self.repo_url(&format!(
                "/pulls?state={}&per_page={}&page={}",
                state, PER_PAGE, page
            ));
            if let Some(head) = head {
                url.push_str(&format!("&head={}", head));
            }
            let batch: Vec<PullRequest> = self
                .call_as("list pull requests", Method::GET, &url, None)
                .await?;
            let last = batch.len() < PER_PAGE as usize;
            pulls.extend(batch);
            if last {
                return Ok(pulls);
            }
        }
        tracing::warn!(state, pages = MAX_PAGES, "pull request listing truncated");
        Ok(pulls)
    }

    /// Open pull requests of the repository, listed on first use
    async fn open_pulls(&self) -> Result<&[ExistingProposal], HostingError> {
        self.open_pulls
            .get_or_try_init(|| async {
                let pulls = self.list_pulls("open", None).await?;
                Ok::<_, HostingError>(pulls.into_iter().map(ExistingProposal::from).collect())
            })
            .await
            .map(Vec::as_slice)
    }

    /// The open pull request whose head is `branch`, if any
    async fn open_pull_for(&self, branch: &str) -> Result<Option<PullRequest>, HostingError> {
        let head = format!("{}:{}", self.config.owner(), branch);
        Ok(self.list_pulls("open", Some(&head)).await?.into_iter().next())
    }

    /// Commit a branch points at, or `None` if it does not exist
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, HostingError> {
        let url = self.repo_url(&format!("/git/ref/heads/{}", branch));
        match self.call("read branch", Method::GET, &url, None).await {
            Ok(value) => string_field(&value, &["object", "sha"], "read branch").map(Some),
            Err(HostingError::Rejected { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn resolve_base(&self, proposal: &ChangeProposal) -> Result<String, HostingError> {
        if let Some(commit) = &proposal.base_commit {
            return Ok(commit.clone());
        }
        let url = self.repo_url(&format!("/git/ref/heads/{}", self.config.base_branch));
        let value = self.call("resolve base branch", Method::GET, &url, None).await?;
        string_field(&value, &["object", "sha"], "resolve base branch")
    }

    async fn create_commit(&self, proposal: &ChangeProposal, base_sha: &str) -> Result<String, HostingError> {
        let url = self.repo_url(&format!("/git/commits/{}", base_sha));
        let base = self.call("read base commit", Method::GET, &url, None).await?;
        let base_tree = string_field(&base, &["tree", "sha"], "read base commit")?;

        let entries: Vec<Value> = proposal
            .changes
            .iter()
            .map(|change| {
                json!({
                    "path": change.path,
                    "mode": "100644",
                    "type": "blob",
                    "content": change.contents,
                })
            })
            .collect();
        let tree = self
            .call(
                "create tree",
                Method::POST,
                &self.repo_url("/git/trees"),
                Some(&json!({ "base_tree": base_tree, "tree": entries })),
            )
            .await?;
        let tree_sha = string_field(&tree, &["sha"], "create tree")?;

        let commit = self
            .call(
                "create commit",
                Method::POST,
                &self.repo_url("/git/commits"),
                Some(&json!({
                    "message": proposal.commit_message,
                    "tree": tree_sha,
                    "parents": [base_sha],
                })),
            )
            .await?;
        string_field(&commit, &["sha"], "create commit")
    }

    async fn create_branch(&self, branch: &str, sha: &str) -> Result<(), HostingError> {
        let body = json!({ "ref": format!("refs/heads/{}", branch), "sha": sha });
        let err = match self
            .call("create branch", Method::POST, &self.repo_url("/git/refs"), Some(&body))
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };

        let exists = matches!(err, HostingError::Rejected { status: 422, .. });
        if exists || err.is_transient() {
            // The commit is fresh, so a branch already pointing at it is ours
            if let Ok(Some(head)) = self.branch_head(branch).await {
                if head == sha {
                    tracing::debug!(branch, "branch already created");
                    return Ok(());
                }
            }
        }
        if exists {
            return Err(HostingError::Conflict {
                branch: branch.to_string(),
            });
        }
        Err(err)
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), HostingError> {
        let url = self.repo_url(&format!("/git/refs/heads/{}", branch));
        self.call("delete branch", Method::DELETE, &url, None).await?;
        Ok(())
    }
}

/// Map a failed response to an error
fn classify_failure(operation: &str, status: StatusCode, body: &str) -> HostingError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && message.to_lowercase().contains("rate limit"));
    if rate_limited {
        return HostingError::RateLimitExceeded {
            operation: operation.to_string(),
        };
    }
    HostingError::rejected(operation, status.as_u16(), message)
}

/// Read a nested string field from a JSON response
fn string_field(value: &Value, path: &[&str], operation: &str) -> Result<String, HostingError> {
    let mut current = value;
    for key in path {
        current = current.get(key).ok_or_else(|| HostingError::InvalidResponse {
            operation: operation.to_string(),
            message: format!("missing field '{}'", path.join(".")),
        })?;
    }
    current
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| HostingError::InvalidResponse {
            operation: operation.to_string(),
            message: format!("field '{}' is not a string", path.join(".")),
        })
}

#[async_trait]
impl Hosting for GitHubClient {
    async fn find_proposals(
        &self,
        query: &ProposalQuery,
    ) -> Result<Vec<ExistingProposal>, HostingError> {
        let mut found: Vec<ExistingProposal> = Vec::new();
        for branch in [query.branch.clone(), conflict_branch(&query.branch)] {
            let head = format!("{}:{}", self.config.owner(), branch);
            for pr in self.list_pulls("all", Some(&head)).await? {
                if !found.iter().any(|p| p.number == pr.number) {
                    found.push(pr.into());
                }
            }
        }

        for proposal in self.open_pulls().await? {
            if query.matches(&proposal.branch) && !found.iter().any(|p| p.number == proposal.number) {
                found.push(proposal.clone());
            }
        }
        Ok(found)
    }

    async fn publish(&self, proposal: &ChangeProposal) -> Result<PublishedProposal, HostingError> {
        let base_sha = self.resolve_base(proposal).await?;
        let commit_sha = self.create_commit(proposal, &base_sha).await?;
        self.create_branch(&proposal.branch, &commit_sha).await?;
        tracing::debug!(branch = %proposal.branch, commit = %commit_sha, "branch created");

        let body = json!({
            "title": proposal.title,
            "head": proposal.branch,
            "base": self.config.base_branch,
            "body": proposal.body,
        });
        let created = self
            .call("create pull request", Method::POST, &self.repo_url("/pulls"), Some(&body))
            .await
            .and_then(|value| {
                serde_json::from_value::<PullRequest>(value).map_err(|e| {
                    HostingError::InvalidResponse {
                        operation: "create pull request".to_string(),
                        message: e.to_string(),
                    }
                })
            });

        let published = |pr: PullRequest| PublishedProposal {
            number: pr.number,
            branch: proposal.branch.clone(),
            url: pr.html_url,
        };
        match created {
            Ok(pr) => Ok(published(pr)),
            Err(e) => {
                // The pull request may exist even though the response was lost
                if e.is_transient() || matches!(e, HostingError::Rejected { status: 422, .. }) {
                    if let Ok(Some(pr)) = self.open_pull_for(&proposal.branch).await {
                        tracing::info!(branch = %proposal.branch, number = pr.number, "pull request already open");
                        return Ok(published(pr));
                    }
                }
                tracing::warn!(branch = %proposal.branch, error = %e, "pull request failed, deleting branch");
                if let Err(cleanup) = self.delete_branch(&proposal.branch).await {
                    tracing::error!(branch = %proposal.branch, error = %cleanup, "failed to delete branch");
                }
                Err(e)
            }
        }
    }

    async fn create_issue(&self, title: &str, body: &str) -> Result<String, HostingError> {
        let value = self
            .call(
                "create issue",
                Method::POST,
                &self.repo_url("/issues"),
                Some(&json!({ "title": title, "body": body })),
            )
            .await?;
        string_field(&value, &["html_url"], "create issue")
    }
}
