//! Chooses the `Authorization` scheme for a credential.
//!
//! OAuth app user-to-server tokens (`gho_…`) are sent as `Bearer`, every other token as `token`.

use std::fmt::{self, Display};

use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::warn;

/// The media type requested from GitHub REST API.
pub const ACCEPT_GITHUB_V3: &str = "application/vnd.github.v3+json";

const OAUTH_TOKEN_PREFIX: &str = "gho_";

/// The scheme prefix of an `Authorization` header.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`, for OAuth app tokens.
    Bearer,
    /// `Authorization: token <token>`, for personal access tokens and anything else.
    Token,
}

impl AuthScheme {
    /// Picks the scheme from the token's literal prefix.
    pub fn for_token(token: &str) -> Self {
        if token.starts_with(OAUTH_TOKEN_PREFIX) {
            Self::Bearer
        } else {
            Self::Token
        }
    }

    /// Returns the scheme as written in the header.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::Token => "token",
        }
    }
}

impl Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the headers for a GitHub REST API request.
///
/// Without a token (or with an empty one) only `Accept` is set. A token that cannot be carried in a header
/// is dropped with a warning rather than failing the request.
pub fn classify(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT_GITHUB_V3));

    let Some(token) = token.filter(|token| !token.is_empty()) else {
        return headers;
    };

    let scheme = AuthScheme::for_token(token);
    match HeaderValue::from_str(&format!("{scheme} {token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Err(err) => warn!("token cannot be sent as a header, sending the request unauthenticated: {err}"),
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(token: Option<&str>) -> Option<String> {
        classify(token)
            .get(header::AUTHORIZATION)
            .map(|value| value.to_str().unwrap().to_owned())
    }

    #[test]
    fn oauth_tokens_use_bearer() {
        for token in ["gho_test_token", "gho_", "gho_abc123"] {
            assert_eq!(AuthScheme::for_token(token), AuthScheme::Bearer);
            assert_eq!(authorization(Some(token)), Some(format!("Bearer {token}")));
        }
    }

    #[test]
    fn other_tokens_use_token_scheme() {
        for token in ["ghp_token_value", "github_pat_11AAA", "ghs_install", "plain", "GHO_upper"] {
            assert_eq!(AuthScheme::for_token(token), AuthScheme::Token);
            assert_eq!(authorization(Some(token)), Some(format!("token {token}")));
        }
    }

    #[test]
    fn absent_or_empty_token_sends_accept_only() {
        for token in [None, Some("")] {
            let headers = classify(token);
            assert_eq!(headers.len(), 1);
            assert_eq!(headers[header::ACCEPT], ACCEPT_GITHUB_V3);
        }
    }

    #[test]
    fn unrepresentable_token_is_dropped() {
        assert_eq!(authorization(Some("ghp_bad\ntoken")), None);
    }
}
