//! Errors surfaced to callers.
//!
//! Each variant renders as the single human-readable line shown in the dashboard's error banner,
//! preferring detail provided by the upstream service over generic HTTP status text.

use thiserror::Error;

/// A GitHub API call that did not succeed.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Listing workflows failed on some page.
    #[error("Failed to fetch workflows: {0}")]
    Workflows(String),
    /// Dispatching a workflow run failed.
    #[error("Failed to trigger workflow: {0}")]
    Dispatch(String),
    /// Both the user and the organization repository listings failed.
    #[error("Failed to fetch repositories: {0}")]
    Repositories(String),
    /// The owner or the repository name was empty.
    #[error("Repository owner and name are required")]
    MissingRepository,
}

/// A failure while completing the OAuth callback.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// The provider redirected back with an `error` parameter.
    #[error("GitHub authentication failed: {0}")]
    Denied(String),
    /// The callback carried neither a code nor an error.
    #[error("No authorization code received")]
    MissingCode,
    /// The relay could not be reached.
    #[error("Failed to complete GitHub authentication: {0}")]
    Unreachable(String),
    /// The relay answered with a non-success status.
    #[error("Failed to complete GitHub authentication: {0}")]
    Rejected(String),
    /// The relay answered without an access token.
    #[error("Failed to complete GitHub authentication: no access token received")]
    MissingToken,
}

/// Renders an HTTP status the way a browser reports `statusText`.
pub(crate) fn status_text(status: reqwest::StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| status.as_u16().to_string(), str::to_owned)
}

/// Extracts the upstream `message` (GitHub) or `error` (relay) field from a JSON error body.
pub(crate) fn upstream_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok()?;

    ["message", "error"]
        .into_iter()
        .filter_map(|field| parsed.get(field).and_then(serde_json::Value::as_str))
        .find(|detail| !detail.trim().is_empty())
        .map(str::to_owned)
}
