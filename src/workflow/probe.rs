//! Decides whether a workflow declares a `workflow_dispatch` trigger.
//!
//! This is a best-effort hint: the workflow file is fetched and searched for the literal trigger name. A file
//! that merely mentions `workflow_dispatch` in a comment is reported as dispatchable.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::Gateway;

/// The trigger whose presence marks a workflow as dispatchable.
pub const DISPATCH_TRIGGER: &str = "workflow_dispatch";

/// Path prefixes of workflows that have no file in the repository, such as those GitHub generates for
/// Dependabot or code scanning.
pub const SYNTHETIC_PREFIXES: &[&str] = &["dynamic/"];

#[derive(Debug, Error)]
enum ProbeError {
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("undecodable content: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("invalid contents url: {0}")]
    Url(#[from] url::ParseError),
}

/// Represents a file from the repository contents endpoint.
#[derive(Debug, Deserialize)]
struct FileContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: Option<String>,
}

impl FileContent {
    fn decode(&self) -> Result<String, ProbeError> {
        match self.encoding.as_deref() {
            Some("base64") => {
                // GitHub wraps the payload every 60 characters
                let compact: String = self
                    .content
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                let bytes = STANDARD.decode(compact)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => Ok(self.content.clone()),
        }
    }
}

/// Checks if a path points at a workflow without a backing file.
pub fn is_synthetic(path: &str) -> bool {
    SYNTHETIC_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// Builds the contents endpoint of a file, percent-encoding every segment of `path`.
fn contents_url(api_root: &str, owner: &str, repo: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(api_root)?;
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(["repos", owner, repo, "contents"])
        .extend(path.split('/'));
    Ok(url)
}

/// Checks if the workflow file at `path` declares a `workflow_dispatch` trigger at `git_ref`.
///
/// Never fails: synthetic paths, missing files, network errors and undecodable content all yield `false`.
pub async fn can_dispatch(
    gateway: &Gateway,
    owner: &str,
    repo: &str,
    path: &str,
    token: Option<&str>,
    git_ref: &str,
) -> bool {
    if is_synthetic(path) {
        debug!("skipping probe of synthetic workflow {path}");
        return false;
    }

    match probe(gateway, owner, repo, path, token, git_ref).await {
        Ok(found) => {
            debug!("probed {path} at {git_ref}: dispatchable = {found}");
            found
        }
        Err(err) => {
            warn!("failed to probe {path} at {git_ref}, treating it as not dispatchable: {err}");
            false
        }
    }
}

async fn probe(
    gateway: &Gateway,
    owner: &str,
    repo: &str,
    path: &str,
    token: Option<&str>,
    git_ref: &str,
) -> Result<bool, ProbeError> {
    let response = gateway
        .request_url(Method::GET, contents_url(&gateway.config().api_root, owner, repo, path)?, token)
        .query(&[("ref", git_ref)])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ProbeError::Status(response.status()));
    }

    let file = response.json::<FileContent>().await?;
    Ok(file.decode()?.contains(DISPATCH_TRIGGER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::GatewayConfig;

    use mockito::Matcher;

    const DISPATCHABLE: &str = "name: Alpha
on:
  workflow_dispatch:
  push:
    branches: [main]
jobs:
  test:
    runs-on: ubuntu-latest
    steps:
      - uses: actions/checkout@v3";

    fn gateway(server: &mockito::Server) -> Gateway {
        Gateway::new(GatewayConfig::new(server.url()))
    }

    fn content_body(text: &str) -> String {
        serde_json::json!({ "content": STANDARD.encode(text), "encoding": "base64" }).to_string()
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = STANDARD.encode(DISPATCHABLE);
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let file = FileContent {
            content: wrapped,
            encoding: Some("base64".to_owned()),
        };

        assert_eq!(file.decode().unwrap(), DISPATCHABLE);
    }

    #[test]
    fn contents_url_encodes_each_segment() {
        let url = contents_url(
            "https://api.github.com",
            "octocat",
            "hello-world",
            ".github/workflows/build #2?.yml",
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octocat/hello-world/contents/.github/workflows/build%20%232%3F.yml"
        );
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);
    }

    #[test]
    fn contents_url_keeps_enterprise_prefix() {
        let url = contents_url(
            "https://git.example.com/api/v3",
            "octocat",
            "hello-world",
            ".github/workflows/ci.yml",
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "https://git.example.com/api/v3/repos/octocat/hello-world/contents/.github/workflows/ci.yml"
        );
    }

    #[test]
    fn recognizes_synthetic_paths() {
        assert!(is_synthetic("dynamic/generated.yml"));
        assert!(!is_synthetic(".github/workflows/dynamic.yml"));
    }

    #[tokio::test]
    async fn file_with_trigger_is_dispatchable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octocat/hello-world/contents/.github/workflows/alpha.yml")
            .match_query(Matcher::UrlEncoded("ref".into(), "dev".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(content_body(DISPATCHABLE))
            .expect(1)
            .create_async()
            .await;

        let found = can_dispatch(
            &gateway(&server),
            "octocat",
            "hello-world",
            ".github/workflows/alpha.yml",
            None,
            "dev",
        )
        .await;

        assert!(found);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn mention_in_comment_still_counts() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/octocat/hello-world/contents/.github/workflows/ci.yml")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(content_body("on: push\n# workflow_dispatch is not enabled yet\n"))
            .create_async()
            .await;

        assert!(
            can_dispatch(
                &gateway(&server),
                "octocat",
                "hello-world",
                ".github/workflows/ci.yml",
                None,
                "main",
            )
            .await
        );
    }

    #[tokio::test]
    async fn file_without_trigger_is_not_dispatchable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/octocat/hello-world/contents/.github/workflows/ci.yml")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(content_body("on:\n  push:\n    branches: [main]\n"))
            .create_async()
            .await;

        assert!(
            !can_dispatch(
                &gateway(&server),
                "octocat",
                "hello-world",
                ".github/workflows/ci.yml",
                None,
                "main",
            )
            .await
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_dispatchable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/octocat/hello-world/contents/.github/workflows/beta.yml")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        assert!(
            !can_dispatch(
                &gateway(&server),
                "octocat",
                "hello-world",
                ".github/workflows/beta.yml",
                None,
                "main",
            )
            .await
        );
    }

    #[tokio::test]
    async fn malformed_content_is_not_dispatchable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/octocat/hello-world/contents/.github/workflows/ci.yml")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"content":"%%%not base64%%%","encoding":"base64"}"#)
            .create_async()
            .await;

        assert!(
            !can_dispatch(
                &gateway(&server),
                "octocat",
                "hello-world",
                ".github/workflows/ci.yml",
                None,
                "main",
            )
            .await
        );
    }

    #[tokio::test]
    async fn synthetic_path_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex("^/repos/".into()))
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let found = can_dispatch(
            &gateway(&server),
            "octocat",
            "hello-world",
            "dynamic/generated.yml",
            Some("gho_token"),
            "main",
        )
        .await;

        assert!(!found);
        mock.assert_async().await;
    }
}
