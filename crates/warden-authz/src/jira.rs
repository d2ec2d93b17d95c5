//! HTTP tracker client for Jira Cloud.

use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use warden_config::Credentials;

use crate::{BoxFuture, IssueRef, TrackerClient, TrackerError};

/// Longest error body kept in [`TrackerError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// [`TrackerClient`] backed by the Jira Cloud REST API v3.
///
/// Requests authenticate as the configured account, so results are limited
/// to what that account can already see. Nothing is retried.
#[derive(Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base: Url,
    email: String,
    api_token: String,
}

impl std::fmt::Debug for JiraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraClient")
            .field("base", &self.base.as_str())
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<IssueRef>,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
struct IssueFields {
    project: ProjectField,
}

#[derive(Debug, Deserialize)]
struct ProjectField {
    key: String,
}

impl JiraClient {
    /// Create a client with a default HTTP client.
    pub fn new(credentials: &Credentials) -> Result<Self, TrackerError> {
        Self::with_http_client(reqwest::Client::new(), credentials)
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_http_client(
        http: reqwest::Client,
        credentials: &Credentials,
    ) -> Result<Self, TrackerError> {
        let mut base = Url::parse(&credentials.site_url).map_err(|e| {
            TrackerError::Transport(format!("invalid site URL '{}': {e}", credentials.site_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(TrackerError::Transport(format!(
                "site URL '{}' cannot carry a path",
                credentials.site_url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http,
            base,
            email: credentials.email.clone(),
            api_token: credentials.api_token.clone(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TrackerError::Transport("site URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn search_issues(&self, jql: &str, max_results: u32) -> Result<Vec<IssueRef>, TrackerError> {
        let url = self.endpoint(&["rest", "api", "3", "search", "jql"])?;
        debug!(%url, max_results, "tracker search");

        let response = self
            .http
            .post(url)
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&json!({
                "jql": jql,
                "maxResults": max_results,
                "fields": ["key"],
            }))
            .send()
            .await
            .map_err(transport)?;

        let body: SearchResponse = check_status(response, jql)
            .await?
            .json()
            .await
            .map_err(|e| TrackerError::Decode(e.to_string()))?;
        Ok(body.issues)
    }

    async fn issue_project_key(&self, issue_key: &str) -> Result<String, TrackerError> {
        let mut url = self.endpoint(&["rest", "api", "3", "issue", issue_key])?;
        url.query_pairs_mut().append_pair("fields", "project");
        debug!(%url, "tracker issue lookup");

        let response = self
            .http
            .get(url)
            .basic_auth(&self.email, Some(&self.api_token))
            .send()
            .await
            .map_err(transport)?;

        let body: IssueResponse = check_status(response, issue_key)
            .await?
            .json()
            .await
            .map_err(|e| TrackerError::Decode(e.to_string()))?;
        Ok(body.fields.project.key)
    }
}

impl TrackerClient for JiraClient {
    fn search<'a>(
        &'a self,
        jql: &'a str,
        max_results: u32,
    ) -> BoxFuture<'a, Result<Vec<IssueRef>, TrackerError>> {
        Box::pin(self.search_issues(jql, max_results))
    }

    fn fetch_issue_project_key<'a>(
        &'a self,
        issue_key: &'a str,
    ) -> BoxFuture<'a, Result<String, TrackerError>> {
        Box::pin(self.issue_project_key(issue_key))
    }
}

fn transport(err: reqwest::Error) -> TrackerError {
    TrackerError::Transport(err.to_string())
}

async fn check_status(response: Response, subject: &str) -> Result<Response, TrackerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TrackerError::Unauthorized {
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(TrackerError::NotFound(subject.to_string())),
        _ => {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            Err(TrackerError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}
