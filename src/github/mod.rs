//! GitHub REST access and webhook authentication.

pub mod signature;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GithubSettings;

pub use signature::{SIGNATURE_HEADER, sign, verify_signature};

const USER_AGENT: &str = concat!("stagebot/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// An issue comment (subset of fields).
#[derive(Debug, Deserialize)]
pub struct IssueComment {
    pub id: i64,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Thin client over the handful of endpoints stagebot uses.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(settings: &GithubSettings, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Post a comment on a pull request and return its id.
    pub async fn create_comment(&self, pr_number: u64, body: &str) -> Result<i64> {
        let url = self.url(&format!("issues/{}/comments", pr_number));
        let comment: IssueComment = self
            .request(reqwest::Method::POST, url)
            .json(&CommentBody { body })
            .send()
            .await
            .context("Failed to send comment to GitHub")?
            .error_for_status()
            .context("GitHub rejected the comment")?
            .json()
            .await
            .context("Failed to parse comment response from GitHub")?;
        debug!(pr_number, comment_id = comment.id, "Created PR comment");
        Ok(comment.id)
    }

    pub async fn edit_comment(&self, comment_id: i64, body: &str) -> Result<()> {
        let url = self.url(&format!("issues/comments/{}", comment_id));
        self.request(reqwest::Method::PATCH, url)
            .json(&CommentBody { body })
            .send()
            .await
            .context("Failed to send comment edit to GitHub")?
            .error_for_status()
            .context("GitHub rejected the comment edit")?;
        Ok(())
    }

    pub async fn delete_comment(&self, comment_id: i64) -> Result<()> {
        let url = self.url(&format!("issues/comments/{}", comment_id));
        self.request(reqwest::Method::DELETE, url)
            .send()
            .await
            .context("Failed to send comment deletion to GitHub")?
            .error_for_status()
            .context("GitHub rejected the comment deletion")?;
        Ok(())
    }

    /// Whether `branch` exists in the repository.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let url = self.url(&format!("git/ref/heads/{}", branch));
        let resp = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .context("Failed to query branch from GitHub")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        resp.error_for_status()
            .context("GitHub branch lookup returned error status")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        requests: Mutex<Vec<String>>,
    }

    /// A local stand-in for the GitHub API.
    async fn fake_github() -> (String, Arc<Recorded>) {
        let recorded = Arc::new(Recorded::default());
        let app = Router::new()
            .route(
                "/repos/acme/site/issues/{number}/comments",
                post(
                    |State(r): State<Arc<Recorded>>,
                     Path(number): Path<u64>,
                     Json(body): Json<serde_json::Value>| async move {
                        r.requests
                            .lock()
                            .unwrap()
                            .push(format!("create {} {}", number, body["body"]));
                        (AxumStatus::CREATED, Json(serde_json::json!({ "id": 7 })))
                    },
                ),
            )
            .route(
                "/repos/acme/site/issues/comments/{id}",
                patch(
                    |State(r): State<Arc<Recorded>>,
                     Path(id): Path<i64>,
                     Json(body): Json<serde_json::Value>| async move {
                        r.requests
                            .lock()
                            .unwrap()
                            .push(format!("edit {} {}", id, body["body"]));
                        Json(serde_json::json!({ "id": id }))
                    },
                )
                .delete(|State(r): State<Arc<Recorded>>, Path(id): Path<i64>| async move {
                    r.requests.lock().unwrap().push(format!("delete {}", id));
                    AxumStatus::NO_CONTENT
                }),
            )
            .route(
                "/repos/acme/site/git/ref/heads/{*branch}",
                get(|Path(branch): Path<String>| async move {
                    if branch == "main" || branch == "feature/x" {
                        AxumStatus::OK
                    } else {
                        AxumStatus::NOT_FOUND
                    }
                }),
            )
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), recorded)
    }

    fn client(api_url: String) -> GithubClient {
        let settings = GithubSettings {
            api_url,
            owner: "acme".to_string(),
            repo: "site".to_string(),
        };
        GithubClient::new(&settings, Some("token".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_comment_lifecycle() {
        let (url, recorded) = fake_github().await;
        let client = client(url);

        let id = client.create_comment(12, "Starting").await.unwrap();
        assert_eq!(id, 7);
        client.edit_comment(id, "50 %").await.unwrap();
        client.delete_comment(id).await.unwrap();

        assert_eq!(
            *recorded.requests.lock().unwrap(),
            vec![
                "create 12 \"Starting\"".to_string(),
                "edit 7 \"50 %\"".to_string(),
                "delete 7".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_branch_exists() {
        let (url, _) = fake_github().await;
        let client = client(url);
        assert!(client.branch_exists("main").await.unwrap());
        assert!(client.branch_exists("feature/x").await.unwrap());
        assert!(!client.branch_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let client = client("http://127.0.0.1:1".to_string());
        assert!(client.branch_exists("main").await.is_err());
    }
}
