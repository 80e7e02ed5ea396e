//! GitHub OAuth login through a secret-holding relay.
//!
//! The flow moves through `idle → redirecting → callback received → exchanging → success | error`. The
//! authorization code is exchanged by the relay configured in [`OAuthConfig::relay_url`], never against
//! GitHub directly, since the exchange needs the OAuth app's client secret.

#![cfg(feature = "oauth")]

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{OAuthError, status_text, upstream_detail};

/// The capabilities requested from GitHub: repository access and dispatching workflows.
pub const SCOPES: &[&str] = &["repo", "workflow"];

/// Where the application routes the user after the callback was handled.
pub const HOME_ROUTE: &str = "/";

/// The OAuth app and relay to log in with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    /// The provider's authorize endpoint, `https://{domain}/login/oauth/authorize`.
    pub authorize_url: String,
    /// The client id of the OAuth app.
    pub client_id: String,
    /// The callback route GitHub redirects to.
    pub redirect_uri: String,
    /// The relay's `/authenticate` endpoint.
    pub relay_url: String,
}

impl OAuthConfig {
    /// Creates a configuration for a GitHub domain, such as `github.com` or an enterprise host.
    pub fn for_domain(
        domain: &str,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        relay_url: impl Into<String>,
    ) -> Self {
        Self {
            authorize_url: format!("https://{domain}/login/oauth/authorize"),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            relay_url: relay_url.into(),
        }
    }

    /// Reads the configuration from `GITHUB_DOMAIN`, `GITHUB_CLIENT_ID`, `OAUTH_REDIRECT_URI` and
    /// `OAUTH_PROXY_URL`.
    pub fn from_env() -> Self {
        use crate::env::{GITHUB_CLIENT_ID, GITHUB_DOMAIN, OAUTH_PROXY_URL, OAUTH_REDIRECT_URI};

        Self::for_domain(
            &GITHUB_DOMAIN,
            GITHUB_CLIENT_ID.as_str(),
            OAUTH_REDIRECT_URI.as_str(),
            OAUTH_PROXY_URL.as_str(),
        )
    }
}

/// Builds the provider authorize URL the browser is sent to.
///
/// # Errors
///
/// Returns a [`url::ParseError`] if `authorize_url` is not an absolute URL.
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[&str],
) -> Result<Url, url::ParseError> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        authorize_url,
        &[
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ],
    )
}

/// The parameters GitHub appends to the callback route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Callback {
    /// The single-use authorization code to exchange.
    pub code: Option<String>,
    /// Takes precedence over `code`: when present, the code must not be exchanged.
    pub error: Option<String>,
}

impl Callback {
    /// Decides what the callback means for the flow.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::Denied`] if GitHub reported an error, or [`OAuthError::MissingCode`] if there is no
    /// code to exchange.
    pub fn into_code(self) -> Result<String, OAuthError> {
        match self {
            Self {
                error: Some(error), ..
            } => Err(OAuthError::Denied(error)),
            Self {
                code: Some(code), ..
            } => Ok(code),
            Self { .. } => Err(OAuthError::MissingCode),
        }
    }
}

/// Extracts `code` and `error` from the callback's query string, with or without the leading `?`.
///
/// Empty values count as absent.
pub fn parse_callback(query: &str) -> Callback {
    let query = query.strip_prefix('?').unwrap_or(query);

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(_, value)| !value.is_empty())
        .fold(Callback::default(), |mut callback, (key, value)| {
            match &*key {
                "code" if callback.code.is_none() => callback.code = Some(value.into_owned()),
                "error" if callback.error.is_none() => callback.error = Some(value.into_owned()),
                _ => {}
            }
            callback
        })
}

#[derive(Debug, Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges an authorization code for an access token through the relay.
///
/// # Errors
///
/// Returns [`OAuthError::Unreachable`] if the relay cannot be reached, [`OAuthError::Rejected`] if it answers
/// with a non-success status, or [`OAuthError::MissingToken`] if its answer carries no access token.
pub async fn exchange_code(
    client: &reqwest::Client,
    relay_url: &str,
    code: &str,
) -> Result<String, OAuthError> {
    debug!("exchanging authorization code through {relay_url}…");

    let response = client
        .post(relay_url)
        .json(&ExchangeRequest { code })
        .send()
        .await
        .map_err(|err| {
            error!("failed to reach the relay at {relay_url}: {err}");
            OAuthError::Unreachable(err.to_string())
        })?;

    let status = response.status();
    if !status.is_success() {
        let detail = response
            .text()
            .await
            .ok()
            .and_then(|body| upstream_detail(&body))
            .unwrap_or_else(|| status_text(status));
        error!("the relay rejected the authorization code: {detail}");
        return Err(OAuthError::Rejected(detail));
    }

    let exchanged = response.json::<ExchangeResponse>().await.map_err(|err| {
        error!("failed to parse the relay's answer: {err}");
        OAuthError::MissingToken
    })?;

    match exchanged.access_token.filter(|token| !token.is_empty()) {
        Some(token) => {
            info!("exchanged authorization code for an access token");
            Ok(token)
        }
        None => {
            error!("the relay answered without an access token");
            Err(OAuthError::MissingToken)
        }
    }
}

/// Where the login flow currently is.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FlowState {
    /// No login in progress.
    #[default]
    Idle,
    /// The browser was sent to the authorize URL.
    Redirecting,
    /// GitHub redirected back to the callback route.
    CallbackReceived,
    /// The code is being exchanged through the relay.
    Exchanging,
    /// An access token was obtained.
    Success,
    /// The login failed with the given message.
    Error(String),
}

/// Drives one login at a time through [`FlowState`].
#[derive(Debug)]
pub struct OAuthFlow {
    client: reqwest::Client,
    config: OAuthConfig,
    state: Mutex<FlowState>,
}

impl OAuthFlow {
    /// Creates an idle flow with a fresh HTTP client.
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Creates an idle flow that shares an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: OAuthConfig) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(FlowState::Idle),
        }
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Returns where the flow currently is.
    pub fn state(&self) -> FlowState {
        self.state.lock().clone()
    }

    fn transition(&self, next: FlowState) {
        let mut state = self.state.lock();
        debug!("oauth flow: {:?} -> {next:?}", *state);
        *state = next;
    }

    /// Starts a login, returning the URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] if the configured authorize URL is invalid.
    pub fn begin(&self) -> Result<Url, url::ParseError> {
        let url = build_authorize_url(
            &self.config.authorize_url,
            &self.config.client_id,
            &self.config.redirect_uri,
            SCOPES,
        )?;
        self.transition(FlowState::Redirecting);
        Ok(url)
    }

    /// Handles the callback route's query string and exchanges the code for an access token.
    ///
    /// The relay is only contacted when the callback carries a code and no error. Authorization codes are
    /// single-use, so the caller should replace the callback entry in its history with [`HOME_ROUTE`] once
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns an [`OAuthError`] if GitHub reported an error, no code was received, or the exchange failed.
    pub async fn complete(&self, query: &str) -> Result<String, OAuthError> {
        self.transition(FlowState::CallbackReceived);

        let code = match parse_callback(query).into_code() {
            Ok(code) => code,
            Err(err) => {
                warn!("oauth callback cannot be exchanged: {err}");
                self.transition(FlowState::Error(err.to_string()));
                return Err(err);
            }
        };

        self.transition(FlowState::Exchanging);
        match exchange_code(&self.client, &self.config.relay_url, &code).await {
            Ok(token) => {
                self.transition(FlowState::Success);
                Ok(token)
            }
            Err(err) => {
                self.transition(FlowState::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Returns the flow to [`FlowState::Idle`].
    pub fn reset(&self) {
        self.transition(FlowState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::Matcher;
    use serde_json::json;

    fn config(relay_url: String) -> OAuthConfig {
        OAuthConfig::for_domain(
            "github.com",
            "Iv1.client",
            "http://localhost:5173/callback",
            relay_url,
        )
    }

    #[test]
    fn authorize_url_carries_client_redirect_and_scopes() {
        let url = build_authorize_url(
            "https://github.com/login/oauth/authorize",
            "Iv1.client",
            "http://localhost:5173/callback",
            SCOPES,
        )
        .unwrap();

        assert_eq!(url.host_str(), Some("github.com"));
        assert_eq!(url.path(), "/login/oauth/authorize");
        let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_owned(), "Iv1.client".to_owned()),
                ("redirect_uri".to_owned(), "http://localhost:5173/callback".to_owned()),
                ("scope".to_owned(), "repo workflow".to_owned()),
            ]
        );
    }

    #[test]
    fn enterprise_domain_changes_authorize_host() {
        let config = OAuthConfig::for_domain("git.example.com", "id", "http://app/callback", "http://relay");
        assert_eq!(config.authorize_url, "https://git.example.com/login/oauth/authorize");
    }

    #[test]
    fn parse_callback_reads_code_and_error() {
        assert_eq!(
            parse_callback("?code=abc123"),
            Callback {
                code: Some("abc123".to_owned()),
                error: None
            }
        );
        assert_eq!(
            parse_callback("error=access_denied&error_description=The+user+denied"),
            Callback {
                code: None,
                error: Some("access_denied".to_owned())
            }
        );
        assert_eq!(parse_callback("?code="), Callback::default());
    }

    #[test]
    fn error_takes_precedence_over_code() {
        let callback = parse_callback("?code=abc123&error=access_denied");
        assert_eq!(
            callback.into_code(),
            Err(OAuthError::Denied("access_denied".to_owned()))
        );
        assert_eq!(Callback::default().into_code(), Err(OAuthError::MissingCode));
    }

    #[tokio::test]
    async fn complete_exchanges_code_through_relay() {
        let mut server = mockito::Server::new_async().await;
        let relay = server
            .mock("POST", "/authenticate")
            .match_body(Matcher::Json(json!({ "code": "abc123" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"gho_success_token"}"#)
            .expect(1)
            .create_async()
            .await;

        let flow = OAuthFlow::new(config(format!("{}/authenticate", server.url())));
        let token = flow.complete("?code=abc123").await.unwrap();

        assert_eq!(token, "gho_success_token");
        assert_eq!(flow.state(), FlowState::Success);
        relay.assert_async().await;
    }

    #[tokio::test]
    async fn denied_callback_never_calls_relay() {
        let mut server = mockito::Server::new_async().await;
        let relay = server
            .mock("POST", "/authenticate")
            .expect(0)
            .create_async()
            .await;

        let flow = OAuthFlow::new(config(format!("{}/authenticate", server.url())));
        let err = flow.complete("?error=access_denied").await.unwrap_err();

        assert_eq!(err.to_string(), "GitHub authentication failed: access_denied");
        assert_eq!(
            flow.state(),
            FlowState::Error("GitHub authentication failed: access_denied".to_owned())
        );
        relay.assert_async().await;
    }

    #[tokio::test]
    async fn relay_rejection_surfaces_its_error() {
        let mut server = mockito::Server::new_async().await;
        let _relay = server
            .mock("POST", "/authenticate")
            .with_status(400)
            .with_body(r#"{"error":"The code passed is incorrect or expired."}"#)
            .create_async()
            .await;

        let flow = OAuthFlow::new(config(format!("{}/authenticate", server.url())));
        let err = flow.complete("?code=stale").await.unwrap_err();

        assert_eq!(
            err,
            OAuthError::Rejected("The code passed is incorrect or expired.".to_owned())
        );
    }

    #[tokio::test]
    async fn relay_answer_without_token_fails() {
        let mut server = mockito::Server::new_async().await;
        let _relay = server
            .mock("POST", "/authenticate")
            .with_status(200)
            .with_body(r#"{"scope":"repo,workflow"}"#)
            .create_async()
            .await;

        let err = exchange_code(
            &reqwest::Client::new(),
            &format!("{}/authenticate", server.url()),
            "abc123",
        )
        .await
        .unwrap_err();

        assert_eq!(err, OAuthError::MissingToken);
    }

    #[tokio::test]
    async fn unreachable_relay_fails() {
        let err = exchange_code(&reqwest::Client::new(), "http://127.0.0.1:1/authenticate", "abc123")
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::Unreachable(_)));
    }

    #[test]
    fn begin_moves_to_redirecting() {
        let flow = OAuthFlow::new(config("http://relay/authenticate".to_owned()));
        let url = flow.begin().unwrap();

        assert!(url.as_str().starts_with("https://github.com/login/oauth/authorize?client_id=Iv1.client"));
        assert_eq!(flow.state(), FlowState::Redirecting);
        flow.reset();
        assert_eq!(flow.state(), FlowState::Idle);
    }
}
