//! The dashboard controller: one user's repository, workflow listing, view choices, and login.
//!
//! A [`Session`] is shared by reference between the handlers of a single UI. Its state sits behind a lock
//! that is never held across an `await`, so a listing for one repository can still be in flight when the
//! user switches to another; the older listing's results are then dropped.

#![cfg(feature = "session")]

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{FetchError, OAuthError},
    framework::{LatestOnly, Outcome, Ticket},
    oauth::{HOME_ROUTE, OAuthConfig, OAuthFlow},
    storage::{KeyValueStore, Storage},
    workflow::{Gateway, RepositoryIdentity, SortOrder, ViewState, Workflow, WorkflowState},
};

/// The input key that carries the ref a workflow was triggered at.
pub const REF_INPUT: &str = "ref";

#[derive(Debug)]
struct DashboardState {
    identity: Option<RepositoryIdentity>,
    workflows: Vec<Workflow>,
    view: ViewState,
    error: Option<String>,
    loading: bool,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            identity: None,
            workflows: Vec::new(),
            view: ViewState {
                sort_order: SortOrder::Ascending,
                ..ViewState::default()
            },
            error: None,
            loading: false,
        }
    }
}

/// Loads, filters, and triggers workflows for one user, and completes their GitHub login.
#[derive(Debug)]
pub struct Session<S> {
    gateway: Gateway,
    oauth: OAuthFlow,
    storage: Storage<S>,
    generations: LatestOnly,
    state: Mutex<DashboardState>,
}

impl<S> Session<S>
where
    S: KeyValueStore,
{
    /// Creates a session with nothing loaded. Workflows are sorted by ascending name until told otherwise.
    pub fn new(gateway: Gateway, oauth: OAuthFlow, storage: Storage<S>) -> Self {
        Self {
            gateway,
            oauth,
            storage,
            generations: LatestOnly::new(),
            state: Mutex::new(DashboardState::default()),
        }
    }

    /// Creates a session configured from the environment, persisting into `store`.
    pub fn from_env(store: S) -> Self {
        Self::new(
            Gateway::from_env(),
            OAuthFlow::new(OAuthConfig::from_env()),
            Storage::new(store),
        )
    }

    /// Returns the persistence layer.
    pub fn storage(&self) -> &Storage<S> {
        &self.storage
    }

    /// Returns the login flow.
    pub fn oauth(&self) -> &OAuthFlow {
        &self.oauth
    }

    /// Restores the persisted repository identity, if any.
    pub fn restore(&self) -> Option<RepositoryIdentity> {
        let identity = self.storage.load_repository_data()?;
        debug!("restored repository {identity}");
        self.state.lock().identity = Some(identity.clone());
        Some(identity)
    }

    /// Returns the repository currently selected.
    pub fn identity(&self) -> Option<RepositoryIdentity> {
        self.state.lock().identity.clone()
    }

    /// Loads the workflows of a repository, replacing the current listing.
    ///
    /// The search term and status filter are reset, and the identity is persisted before fetching. If another
    /// repository is loaded before this listing completes, this listing is dropped and [`Outcome::Stale`]
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MissingRepository`] if the owner or name is empty, or the listing's
    /// [`FetchError`]. Either is also shown as the error banner.
    pub async fn load_workflows(
        &self,
        identity: RepositoryIdentity,
    ) -> Result<Outcome<usize>, FetchError> {
        if !identity.is_complete() {
            let err = FetchError::MissingRepository;
            self.state.lock().error = Some(err.to_string());
            return Err(err);
        }

        let ticket = self.begin_listing(&identity);
        let result = self
            .gateway
            .list_workflows(
                &identity.owner,
                &identity.repo,
                identity.token.as_deref(),
                &self.gateway.config().default_ref,
            )
            .await;

        self.finish_listing(&ticket, result).transpose()
    }

    fn begin_listing(&self, identity: &RepositoryIdentity) -> Ticket {
        {
            let mut state = self.state.lock();
            state.loading = true;
            state.error = None;
            state.view.search_term.clear();
            state.view.status_filter = None;
            state.identity = Some(identity.clone());
        }
        self.storage.save_repository_data(identity);

        self.generations.begin(identity.to_string())
    }

    fn finish_listing(
        &self,
        ticket: &Ticket,
        result: Result<Vec<Workflow>, FetchError>,
    ) -> Outcome<Result<usize, FetchError>> {
        ticket.check(result, |result| {
            let mut state = self.state.lock();
            state.loading = false;
            match result {
                Ok(workflows) => {
                    let count = workflows.len();
                    state.workflows = workflows;
                    Ok(count)
                }
                Err(err) => {
                    state.workflows.clear();
                    state.error = Some(err.to_string());
                    Err(err)
                }
            }
        })
    }

    /// Returns whether a listing is in flight.
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Returns the listing as fetched.
    pub fn workflows(&self) -> Vec<Workflow> {
        self.state.lock().workflows.clone()
    }

    /// Returns the listing filtered and sorted by the current view choices.
    pub fn filtered_workflows(&self) -> Vec<Workflow> {
        let state = self.state.lock();
        state.view.apply(&state.workflows)
    }

    /// Returns the current view choices.
    pub fn view(&self) -> ViewState {
        self.state.lock().view.clone()
    }

    /// Sets the search term.
    pub fn set_search_term(&self, search_term: impl Into<String>) {
        self.state.lock().view.search_term = search_term.into();
    }

    /// Sets the status filter. [`None`] shows every state.
    pub fn set_status_filter(&self, status_filter: Option<WorkflowState>) {
        self.state.lock().view.status_filter = status_filter;
    }

    /// Sets the sort order.
    pub fn set_sort_order(&self, sort_order: SortOrder) {
        self.state.lock().view.sort_order = sort_order;
    }

    /// Describes how many workflows are shown, once a non-empty listing is loaded.
    pub fn summary(&self) -> Option<String> {
        let state = self.state.lock();
        if state.loading || state.workflows.is_empty() {
            return None;
        }

        Some(format!(
            "Showing {} of {} workflows",
            state.view.apply(&state.workflows).len(),
            state.workflows.len()
        ))
    }

    /// Dispatches a workflow of the current repository.
    ///
    /// The inputs are persisted together with the ref before dispatching; the `ref` entry itself is not sent
    /// as an input. A missing or empty ref falls back to the default ref.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::MissingRepository`] if no repository is selected, or the dispatch's
    /// [`FetchError`]. Either is also shown as the error banner.
    pub async fn trigger_workflow(
        &self,
        workflow_id: u64,
        workflow_name: &str,
        mut inputs: BTreeMap<String, String>,
        git_ref: Option<&str>,
    ) -> Result<(), FetchError> {
        let Some(identity) = self.identity().filter(RepositoryIdentity::is_complete) else {
            let err = FetchError::MissingRepository;
            self.state.lock().error = Some(err.to_string());
            return Err(err);
        };

        let git_ref = git_ref
            .filter(|git_ref| !git_ref.is_empty())
            .unwrap_or(self.gateway.config().default_ref.as_str())
            .to_owned();

        inputs.insert(REF_INPUT.to_owned(), git_ref.clone());
        self.storage.save_workflow_inputs(workflow_name, &inputs);
        inputs.remove(REF_INPUT);

        let result = self
            .gateway
            .trigger_workflow(
                &identity.owner,
                &identity.repo,
                workflow_id,
                Some(&git_ref),
                Some(&inputs),
                identity.token.as_deref(),
            )
            .await;

        match &result {
            Ok(()) => info!("triggered {workflow_name} of {identity} at {git_ref}"),
            Err(err) => self.state.lock().error = Some(err.to_string()),
        }
        result
    }

    /// Returns the inputs last used to trigger a workflow named `workflow_name`, in any repository.
    pub fn remembered_inputs(&self, workflow_name: &str) -> Option<BTreeMap<String, String>> {
        self.storage
            .load_workflow_inputs()
            .filter(|stored| stored.workflow_name == workflow_name)
            .map(|stored| stored.inputs)
    }

    /// Lists the repositories of `owner` with the current token.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Repositories`] if neither the user nor the organization listing succeeds.
    pub async fn list_repositories(&self, owner: &str) -> Result<Vec<String>, FetchError> {
        let token = self.identity().and_then(|identity| identity.token);
        self.gateway.list_repositories(owner, token.as_deref()).await
    }

    /// Starts a GitHub login, returning the URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] if the configured authorize URL is invalid.
    pub fn begin_login(&self) -> Result<Url, url::ParseError> {
        self.oauth.begin()
    }

    /// Completes a GitHub login from the callback route's query string.
    ///
    /// On success the token is persisted with the current repository, or with the saved one if the session has not
    /// restored it yet. The returned route should replace the callback in the browser history, so a reload cannot
    /// replay the consumed code.
    ///
    /// # Errors
    ///
    /// Returns the [`OAuthError`] of the callback, which is also shown as the error banner.
    pub async fn complete_oauth(&self, query: &str) -> Result<&'static str, OAuthError> {
        let token = match self.oauth.complete(query).await {
            Ok(token) => token,
            Err(err) => {
                warn!("github login failed: {err}");
                self.state.lock().error = Some(err.to_string());
                return Err(err);
            }
        };

        let identity = {
            let mut state = self.state.lock();
            let identity = match state
                .identity
                .take()
                .or_else(|| self.storage.load_repository_data())
            {
                Some(identity) => RepositoryIdentity {
                    token: Some(token),
                    ..identity
                },
                None => RepositoryIdentity::new("", "", Some(token)),
            };
            state.identity = Some(identity.clone());
            identity
        };
        self.storage.save_repository_data(&identity);

        info!("logged in with github");
        Ok(HOME_ROUTE)
    }

    /// Forgets the repository, the token, the listing and the view choices.
    ///
    /// The last trigger's inputs are kept. Any listing still in flight is dropped when it completes.
    pub fn logout(&self) {
        self.generations.invalidate();
        {
            let mut state = self.state.lock();
            let sort_order = state.view.sort_order;
            *state = DashboardState::default();
            state.view.sort_order = sort_order;
        }
        self.storage.clear_repository_data();
        self.oauth.reset();
        info!("logged out");
    }

    /// Returns the error banner's message.
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Dismisses the error banner.
    pub fn dismiss_error(&self) {
        self.state.lock().error = None;
    }
}
