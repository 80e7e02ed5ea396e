//! Data models of GitHub Actions workflows and the operations around them.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub mod gateway;
pub mod headers;
pub mod probe;
pub mod view;

pub use gateway::{Gateway, GatewayConfig};
pub use headers::{AuthScheme, classify};
pub use probe::can_dispatch;
pub use view::{SortOrder, ViewState};

/// The ref used when neither the caller nor the environment names one.
pub const FALLBACK_REF: &str = "main";

/// Whether a workflow is enabled on GitHub.
///
/// States GitHub adds later decode as [`WorkflowState::Unknown`], so one unfamiliar workflow never fails a
/// whole listing.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// The workflow runs on its triggers.
    Active,
    /// The workflow is disabled.
    Disabled,
    /// Someone disabled the workflow from the UI or the API.
    DisabledManually,
    /// GitHub disabled the workflow after a period without repository activity.
    DisabledInactivity,
    /// The workflow belongs to a fork, where workflows start disabled.
    DisabledFork,
    /// The workflow file was deleted.
    Deleted,
    /// Any state not listed above.
    #[serde(other)]
    Unknown,
}

impl WorkflowState {
    /// Returns the state as GitHub spells it.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::DisabledManually => "disabled_manually",
            Self::DisabledInactivity => "disabled_inactivity",
            Self::DisabledFork => "disabled_fork",
            Self::Deleted => "deleted",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a status selector value. Anything unrecognized maps to [`WorkflowState::Unknown`].
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "disabled" => Self::Disabled,
            "disabled_manually" => Self::DisabledManually,
            "disabled_inactivity" => Self::DisabledInactivity,
            "disabled_fork" => Self::DisabledFork,
            "deleted" => Self::Deleted,
            _ => Self::Unknown,
        }
    }
}

impl Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a workflow from GitHub REST API, annotated with whether it can be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Workflow {
    /// The numeric id, used to dispatch the workflow.
    pub id: u64,
    /// The display name, taken from the workflow file's `name` key.
    pub name: String,
    /// The file path relative to the repository root. Dynamic workflows use a synthetic path.
    pub path: String,
    /// Whether the workflow is enabled.
    pub state: WorkflowState,
    /// ISO 8601 creation time.
    pub created_at: String,
    /// ISO 8601 time of the last change.
    pub updated_at: String,
    /// The REST API URL of the workflow.
    pub url: String,
    /// The workflow's page on GitHub.
    pub html_url: String,
    /// The status badge image.
    pub badge_url: String,
    /// [`None`] until the workflow file was probed; `Some(false)` once the probe ruled dispatch out.
    #[serde(
        rename = "canTrigger",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub can_trigger: Option<bool>,
}

impl Workflow {
    /// Returns a copy carrying the probe result.
    pub fn with_can_trigger(self, can_trigger: bool) -> Self {
        Self {
            can_trigger: Some(can_trigger),
            ..self
        }
    }
}

impl Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.name, self.id, self.path)
    }
}

/// One page of the workflow listing endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowPage {
    /// The number of workflows across all pages, as GitHub reports it.
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

/// The repository a session is looking at.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepositoryIdentity {
    /// The user or organization owning the repository.
    pub owner: String,
    /// The repository name, without the owner.
    pub repo: String,
    /// A personal access token or an OAuth access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl RepositoryIdentity {
    /// Creates an identity, treating a blank token as no token.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            token: token.filter(|token| !token.is_empty()),
        }
    }

    /// Checks that both the owner and the repository name are given.
    pub fn is_complete(&self) -> bool {
        !self.owner.trim().is_empty() && !self.repo.trim().is_empty()
    }
}

impl fmt::Debug for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryIdentity")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}
