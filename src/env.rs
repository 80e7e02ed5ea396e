//! Defines the environment variables to use.
//!
//! Every variable falls back to a default when unset or unparsable, so reading one never panics.

#![cfg(feature = "env")]

use crate::static_lazy_lock;

/// Parses an environment variable from [`String`] to something else, wrapping any error in [`anyhow::Error`].
#[macro_export]
macro_rules! parse_env {
    ($key:expr => |$var:ident| $expr:expr) => {
        std::env::var($key)
            .map_err(|e| anyhow::anyhow!(e))
            .and_then(|$var| $expr)
    };
    ($key:expr => |$var:ident| $expr:expr; anyhow) => {
        parse_env!($key => |$var| $expr.map_err(|e| anyhow::anyhow!(e)))
    };
}

pub use parse_env;

/// Reads a non-blank environment variable, trimming surrounding whitespace.
fn non_blank(key: &str) -> anyhow::Result<String> {
    parse_env!(key => |s| match s.trim() {
        "" => Err(anyhow::anyhow!("{key} is blank")),
        value => Ok(value.to_owned()),
    })
}

static_lazy_lock! {
    /// The GitHub domain, `github.com` or the host of a GitHub Enterprise Server.
    pub GITHUB_DOMAIN: String = non_blank("GITHUB_DOMAIN").unwrap_or_else(|_| "github.com".to_owned());
}

static_lazy_lock! {
    /// The client id of the OAuth app.
    pub GITHUB_CLIENT_ID: String =
        non_blank("GITHUB_CLIENT_ID").unwrap_or_else(|_| "YOUR_CLIENT_ID_HERE".to_owned());
}

static_lazy_lock! {
    /// Where GitHub redirects back to after the user authorizes the OAuth app.
    pub OAUTH_REDIRECT_URI: String =
        non_blank("OAUTH_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:5173/callback".to_owned());
}

static_lazy_lock! {
    /// The relay endpoint that exchanges authorization codes for access tokens.
    pub OAUTH_PROXY_URL: String =
        non_blank("OAUTH_PROXY_URL").unwrap_or_else(|_| "https://github-oauth-proxy.example.com/authenticate".to_owned());
}

static_lazy_lock! {
    /// The ref used when a caller does not name one.
    pub DEFAULT_REF: String = non_blank("DEFAULT_REF").unwrap_or_else(|_| crate::workflow::FALLBACK_REF.to_owned());
}

/// Builds the REST API root for a GitHub domain.
///
/// `github.com` is served from `https://api.github.com`; enterprise hosts serve the API under `/api/v3`.
pub fn api_root_for(domain: &str) -> String {
    match domain {
        "github.com" => "https://api.github.com".to_owned(),
        domain => format!("https://{domain}/api/v3"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_root_for_public_github() {
        assert_eq!(api_root_for("github.com"), "https://api.github.com");
    }

    #[test]
    fn api_root_for_enterprise_host() {
        assert_eq!(
            api_root_for("git.example.com"),
            "https://git.example.com/api/v3"
        );
    }
}
