//! Code hosting collaborator
//!
//! A narrow capability interface over the hosting platform: look up
//! existing proposals, publish a new one, file an issue.

mod github;

pub use github::{GitHubClient, DEFAULT_API_URL};

use crate::error::HostingError;
use crate::proposer::ChangeProposal;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a proposal on the hosting platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalState {
    Open,
    Closed,
    Merged,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalState::Open => write!(f, "open"),
            ProposalState::Closed => write!(f, "closed"),
            ProposalState::Merged => write!(f, "merged"),
        }
    }
}

/// A proposal that already exists on the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingProposal {
    pub number: u64,
    pub branch: String,
    pub url: String,
    pub state: ProposalState,
}

/// Which existing proposals to look up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalQuery {
    /// Every proposal whose branch starts with this prefix
    pub branch_prefix: String,
    /// The branch about to be proposed; matched in any state
    pub branch: String,
}

impl ProposalQuery {
    /// True if `branch` falls under this query
    pub fn matches(&self, branch: &str) -> bool {
        branch.starts_with(&self.branch_prefix)
    }
}

/// A proposal that was just published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedProposal {
    pub number: u64,
    pub branch: String,
    pub url: String,
}

/// Operations stubsabot needs from the hosting platform
#[async_trait]
pub trait Hosting: Send + Sync {
    /// Proposals in any state matching the query
    async fn find_proposals(
        &self,
        query: &ProposalQuery,
    ) -> Result<Vec<ExistingProposal>, HostingError>;

    /// Create the branch, commit and pull request for a proposal
    ///
    /// Either everything is created or nothing is left behind. Fails with
    /// `HostingError::Conflict` if the branch already exists.
    async fn publish(&self, proposal: &ChangeProposal) -> Result<PublishedProposal, HostingError>;

    /// File an issue and return its URL
    async fn create_issue(&self, title: &str, body: &str) -> Result<String, HostingError>;
}
