//! Workflow and repository operations against GitHub REST API.

use std::collections::BTreeMap;

use futures::future::join_all;
use reqwest::{IntoUrl, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::{FALLBACK_REF, Workflow, WorkflowPage, headers, probe};
use crate::error::{FetchError, status_text, upstream_detail};

/// The page size used for every listing endpoint.
pub const PER_PAGE: usize = 100;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Where and how the gateway talks to GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// The REST API root, either `https://api.github.com` or an enterprise `https://{host}/api/v3`.
    pub api_root: String,
    /// The ref used when a dispatch names none.
    pub default_ref: String,
}

impl GatewayConfig {
    /// Creates a configuration for an API root, falling back to [`FALLBACK_REF`].
    pub fn new(api_root: impl Into<String>) -> Self {
        Self {
            api_root: api_root.into().trim_end_matches('/').to_owned(),
            default_ref: FALLBACK_REF.to_owned(),
        }
    }

    /// Reads the configuration from `GITHUB_DOMAIN` and `DEFAULT_REF`.
    #[cfg(feature = "env")]
    pub fn from_env() -> Self {
        use crate::env::{DEFAULT_REF, GITHUB_DOMAIN, api_root_for};

        Self {
            default_ref: DEFAULT_REF.clone(),
            ..Self::new(api_root_for(&GITHUB_DOMAIN))
        }
    }
}

/// Fetches, paginates and annotates workflows, dispatches runs, and lists repositories.
///
/// A gateway holds no per-repository state and can be shared between sessions.
#[derive(Debug, Clone)]
pub struct Gateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Serialize)]
struct DispatchBody<'a> {
    #[serde(rename = "ref")]
    git_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    inputs: Option<&'a BTreeMap<String, String>>,
}

/// Represents a repository from the repository listing endpoints.
#[derive(Debug, Deserialize)]
struct RepositorySummary {
    name: String,
}

/// The two repository listings GitHub offers for an account.
#[derive(Debug, Clone, Copy)]
enum Account {
    User,
    Organization,
}

impl Account {
    const fn segment(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Organization => "orgs",
        }
    }
}

impl Gateway {
    /// Creates a [`Gateway`] with a fresh HTTP client.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates a [`Gateway`] that shares an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    /// Creates a [`Gateway`] configured from the environment.
    ///
    /// See: [`GatewayConfig::from_env`]
    #[cfg(feature = "env")]
    pub fn from_env() -> Self {
        Self::new(GatewayConfig::from_env())
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Builds a request for GitHub REST API, relative to the configured API root.
    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.request_url(method, format!("{}{path}", self.config.api_root), token)
    }

    /// Builds a request for GitHub REST API to an absolute URL.
    pub fn request_url<U>(&self, method: Method, url: U, token: Option<&str>) -> RequestBuilder
    where
        U: IntoUrl,
    {
        self.client
            .request(method, url)
            .headers(headers::classify(token))
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
    }

    /// Lists every workflow of a repository at `git_ref`, annotated with whether it can be dispatched.
    ///
    /// Pages are fetched in order until one comes back shorter than [`PER_PAGE`]. The workflow files are then
    /// probed concurrently; a failed probe marks only its own workflow as not dispatchable.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Workflows`] if any page request fails. No partial listing is returned.
    pub async fn list_workflows(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
        git_ref: &str,
    ) -> Result<Vec<Workflow>, FetchError> {
        let path = format!("/repos/{owner}/{repo}/actions/workflows");
        debug!("fetching workflows of {owner}/{repo} at {git_ref}…");

        let mut workflows = Vec::new();
        for page in 1usize.. {
            let response = self
                .request(Method::GET, &path, token)
                .query(&[("ref", git_ref)])
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await
                .map_err(|err| {
                    error!("failed to fetch page {page} of workflows from {path}: {err}");
                    FetchError::Workflows(err.to_string())
                })?;

            if !response.status().is_success() {
                let status = response.status();
                error!("failed to fetch page {page} of workflows from {path}: {status}");
                return Err(FetchError::Workflows(status_text(status)));
            }

            let WorkflowPage {
                total_count,
                workflows: batch,
            } = response.json::<WorkflowPage>().await.map_err(|err| {
                error!("failed to parse page {page} of workflows from {path}: {err}");
                FetchError::Workflows(err.to_string())
            })?;

            let count = batch.len();
            debug!("fetched {count} workflows on page {page} (total {total_count:?})");
            workflows.extend(batch);

            if count < PER_PAGE {
                break;
            }
        }

        let workflows = join_all(workflows.into_iter().map(|workflow| async move {
            let can_trigger =
                probe::can_dispatch(self, owner, repo, &workflow.path, token, git_ref).await;
            workflow.with_can_trigger(can_trigger)
        }))
        .await;

        match workflows.len() {
            1 => info!("fetched 1 workflow from {owner}/{repo}"),
            count => info!("fetched {count} workflows from {owner}/{repo}"),
        }
        Ok(workflows)
    }

    /// Dispatches a `workflow_dispatch` event.
    ///
    /// A missing or empty `git_ref` falls back to the configured default ref. `inputs` is only sent when it has
    /// entries, since GitHub rejects an `inputs` key for workflows that declare none.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Dispatch`] carrying GitHub's `message` if present, the status text otherwise.
    pub async fn trigger_workflow(
        &self,
        owner: &str,
        repo: &str,
        workflow_id: u64,
        git_ref: Option<&str>,
        inputs: Option<&BTreeMap<String, String>>,
        token: Option<&str>,
    ) -> Result<(), FetchError> {
        let path = format!("/repos/{owner}/{repo}/actions/workflows/{workflow_id}/dispatches");
        let body = DispatchBody {
            git_ref: git_ref
                .filter(|git_ref| !git_ref.is_empty())
                .unwrap_or(self.config.default_ref.as_str()),
            inputs: inputs.filter(|inputs| !inputs.is_empty()),
        };
        debug!("dispatching workflow {workflow_id} of {owner}/{repo} at {}…", body.git_ref);

        let response = self
            .request(Method::POST, &path, token)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!("failed to dispatch workflow {workflow_id}: {err}");
                FetchError::Dispatch(err.to_string())
            })?;

        if response.status().is_success() {
            info!("dispatched workflow {workflow_id} of {owner}/{repo} at {}", body.git_ref);
            Ok(())
        } else {
            let detail = failure_detail(response).await;
            error!("failed to dispatch workflow {workflow_id}: {detail}");
            Err(FetchError::Dispatch(detail))
        }
    }

    /// Lists the names of an account's repositories, sorted case-insensitively.
    ///
    /// The user listing is tried first. If it fails or comes back empty, the organization listing is used
    /// instead. The two listings are never merged.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Repositories`] if the organization listing fails after the user listing did not
    /// produce any repository.
    pub async fn list_repositories(
        &self,
        owner: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>, FetchError> {
        let mut names = match self.fetch_repositories(Account::User, owner, token).await {
            Ok(names) if !names.is_empty() => names,
            Ok(_) => {
                debug!("no user repositories for {owner}, trying organization repositories…");
                self.fetch_repositories(Account::Organization, owner, token)
                    .await?
            }
            Err(err) => {
                warn!("{err}, trying organization repositories of {owner}…");
                self.fetch_repositories(Account::Organization, owner, token)
                    .await?
            }
        };

        names.sort_by_cached_key(|name| name.to_lowercase());
        info!("fetched {} repositories of {owner}", names.len());
        Ok(names)
    }

    async fn fetch_repositories(
        &self,
        account: Account,
        owner: &str,
        token: Option<&str>,
    ) -> Result<Vec<String>, FetchError> {
        let path = format!("/{}/{owner}/repos", account.segment());
        debug!("fetching repositories from {path}…");

        let response = self
            .request(Method::GET, &path, token)
            .query(&[("per_page", PER_PAGE.to_string().as_str()), ("sort", "updated"), ("type", "all")])
            .send()
            .await
            .map_err(|err| FetchError::Repositories(err.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Repositories(failure_detail(response).await));
        }

        let repositories = response
            .json::<Vec<RepositorySummary>>()
            .await
            .map_err(|err| FetchError::Repositories(err.to_string()))?;

        Ok(repositories
            .into_iter()
            .map(|repository| repository.name)
            .collect())
    }
}

/// Reads the most specific failure description out of an unsuccessful response.
async fn failure_detail(response: Response) -> String {
    let status = response.status();
    response
        .text()
        .await
        .ok()
        .and_then(|body| upstream_detail(&body))
        .unwrap_or_else(|| status_text(status))
}
