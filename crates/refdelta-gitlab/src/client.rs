use std::time::Duration;

use async_trait::async_trait;
use refdelta_core::{
    CommitPage, CommitRecord, CommitRef, CommitWindow, DeltaError, GitLabConfig, ProjectHandle,
    Transport, TransportError, TransportErrorKind,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;

/// Largest page size GitLab honors.
pub const MAX_PAGE_SIZE: u32 = 100;

const NEXT_PAGE_HEADER: &str = "x-next-page";

/// A group named either by id or by full path.
///
/// # Examples
///
/// ```
/// use refdelta_gitlab::client::GroupRef;
///
/// assert_eq!(GroupRef::Path("platform/backend".into()).to_string(), "platform/backend");
/// assert_eq!(GroupRef::Id(42).to_string(), "42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    /// Numeric group id.
    Id(u64),
    /// Full group path.
    Path(String),
}

impl std::fmt::Display for GroupRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupRef::Id(id) => write!(f, "{id}"),
            GroupRef::Path(path) => write!(f, "{path}"),
        }
    }
}

/// GitLab v4 REST client.
///
/// Owns authentication, timeouts, retries with exponential backoff, error
/// classification, and `x-next-page` pagination. One instance is shared by
/// every concurrent project task; it holds no per-request state.
///
/// # Examples
///
/// ```
/// use refdelta_core::GitLabConfig;
/// use refdelta_gitlab::GitLabClient;
///
/// let config = GitLabConfig {
///     base_url: "https://gitlab.example.com".into(),
///     private_token: Some("glpat-xxxx".into()),
///     ..GitLabConfig::default()
/// };
/// let client = GitLabClient::new(&config).unwrap();
/// assert_eq!(client.api_base().as_str(), "https://gitlab.example.com/api/v4/");
/// ```
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
    max_retries: u32,
    backoff: Duration,
}

impl GitLabClient {
    /// Create a client from connection configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Config`] if the token is missing, the base URL
    /// does not parse, or the HTTP client cannot be built.
    pub fn new(config: &GitLabConfig) -> Result<Self, DeltaError> {
        let token = config
            .private_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DeltaError::Config("gitlab.private_token is required".into()))?;

        let api_base = Url::parse(&format!(
            "{}/api/{}/",
            config.base_url.trim_end_matches('/'),
            config.api_version
        ))
        .map_err(|e| {
            DeltaError::Config(format!("invalid gitlab.base_url '{}': {e}", config.base_url))
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(concat!("refdelta/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeltaError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            token,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Override the base backoff delay (default: one second, doubled per retry).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The `…/api/{version}/` URL every endpoint hangs off.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Build an endpoint URL; every segment is percent-encoded, so `/` in a
    /// branch or project path stays inside its segment.
    pub fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, TransportError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::new(
                    TransportErrorKind::Malformed,
                    format!("base URL cannot carry a path: {}", self.api_base),
                )
            })?
            .pop_if_empty()
            .extend(segments.iter().map(|s| s.as_ref()));
        Ok(url)
    }

    /// GET with retries; returns the successful response.
    async fn get(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, TransportError> {
        let mut attempt = 0;
        loop {
            let (err, retry_after) = match self.send_once(url, query).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };
            if !err.kind.is_transient() || attempt >= self.max_retries {
                return Err(err);
            }
            let delay = retry_after.unwrap_or_else(|| self.backoff * 2u32.pow(attempt));
            tracing::warn!(
                url = %url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "retrying after {err}"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, (TransportError, Option<Duration>)> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| (classify_reqwest_error(&e), None))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        let message = match status {
            StatusCode::UNAUTHORIZED => "authentication failed, check your private token".into(),
            StatusCode::FORBIDDEN => "access forbidden, check your permissions".into(),
            StatusCode::NOT_FOUND => url.path().to_string(),
            _ => error_message(status, &body),
        };
        Err((
            TransportError::new(TransportErrorKind::from_status(status.as_u16()), message),
            retry_after,
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<(T, Option<u32>), TransportError> {
        let response = self.get(url, query).await?;
        let next_page = parse_next_page(response.headers());
        let body = response
            .json::<T>()
            .await
            .map_err(|e| TransportError::new(TransportErrorKind::Malformed, e.to_string()))?;
        Ok((body, next_page))
    }

    /// Fetch every page of a list endpoint.
    ///
    /// # Errors
    ///
    /// Returns the first [`TransportError`] encountered; earlier pages are
    /// discarded.
    pub async fn get_paginated<T: DeserializeOwned>(
        &self,
        url: &Url,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, TransportError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let mut paged: Vec<(&str, String)> = query.to_vec();
            paged.push(("per_page", MAX_PAGE_SIZE.to_string()));
            paged.push(("page", page.to_string()));

            let (batch, next): (Vec<T>, _) = self.get_json(url, &paged).await?;
            if batch.is_empty() {
                break;
            }
            items.extend(batch);
            match next {
                Some(n) if n > page => page = n,
                _ => break,
            }
        }
        Ok(items)
    }

    /// Fetch a project by numeric id.
    pub async fn get_project_by_id(&self, id: u64) -> Result<ProjectHandle, TransportError> {
        let url = self.endpoint(&["projects".to_string(), id.to_string()])?;
        Ok(self.get_json(&url, &[]).await?.0)
    }

    /// Fetch a project by namespaced path.
    pub async fn get_project_by_path(&self, path: &str) -> Result<ProjectHandle, TransportError> {
        let url = self.endpoint(&["projects", path])?;
        Ok(self.get_json(&url, &[]).await?.0)
    }

    /// List the non-archived projects of a group.
    pub async fn list_group_projects(
        &self,
        group: &GroupRef,
        include_subgroups: bool,
    ) -> Result<Vec<ProjectHandle>, TransportError> {
        let group = group.to_string();
        let url = self.endpoint(&["groups", &group, "projects"])?;
        let query = [
            ("include_subgroups", include_subgroups.to_string()),
            ("archived", "false".to_string()),
        ];
        self.get_paginated(&url, &query).await
    }

    /// Check connectivity and credentials; returns the instance version.
    pub async fn version(&self) -> Result<String, TransportError> {
        let url = self.endpoint(&["version"])?;
        let (body, _): (serde_json::Value, _) = self.get_json(&url, &[]).await?;
        Ok(body
            .get("version")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string())
    }

    async fn check_exists(&self, segments: &[&str]) -> Result<(), TransportError> {
        let url = self.endpoint(segments)?;
        self.get(&url, &[]).await.map(|_| ())
    }
}

#[async_trait]
impl Transport for GitLabClient {
    async fn get_tag(&self, project_id: u64, name: &str) -> Result<(), TransportError> {
        let id = project_id.to_string();
        self.check_exists(&["projects", &id, "repository", "tags", name])
            .await
    }

    async fn get_branch(&self, project_id: u64, name: &str) -> Result<(), TransportError> {
        let id = project_id.to_string();
        self.check_exists(&["projects", &id, "repository", "branches", name])
            .await
    }

    async fn get_commit(&self, project_id: u64, sha: &str) -> Result<CommitRecord, TransportError> {
        let id = project_id.to_string();
        let url = self.endpoint(&["projects", &id, "repository", "commits", sha])?;
        Ok(self.get_json(&url, &[]).await?.0)
    }

    async fn list_commit_refs(
        &self,
        project_id: u64,
        sha: &str,
    ) -> Result<Vec<CommitRef>, TransportError> {
        let id = project_id.to_string();
        let url = self.endpoint(&["projects", &id, "repository", "commits", sha, "refs"])?;
        let query = [("type", "all".to_string())];
        self.get_paginated(&url, &query).await
    }

    async fn list_commits_page(
        &self,
        project_id: u64,
        ref_name: &str,
        window: &CommitWindow,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage, TransportError> {
        let id = project_id.to_string();
        let url = self.endpoint(&["projects", &id, "repository", "commits"])?;
        let mut query = vec![
            ("ref_name", ref_name.to_string()),
            ("per_page", per_page.clamp(1, MAX_PAGE_SIZE).to_string()),
            ("page", page.to_string()),
        ];
        if let Some(since) = &window.since {
            query.push(("since", since.clone()));
        }
        if let Some(until) = &window.until {
            query.push(("until", until.clone()));
        }
        let (commits, next_page): (Vec<CommitRecord>, _) = self.get_json(&url, &query).await?;
        Ok(CommitPage { commits, next_page })
    }
}

/// Read the `x-next-page` header; an empty value means "last page".
pub fn parse_next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(NEXT_PAGE_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs: u64 = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs))
}

/// Build a readable message for a failed response: GitLab's `message`
/// field when the body is JSON, otherwise the first 200 characters.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").cloned())
        .map(|m| match m {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    if detail.is_empty() {
        format!("API request failed: {status}")
    } else {
        format!("API request failed: {status} - {detail}")
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_decode() || err.is_body() {
        TransportErrorKind::Malformed
    } else {
        TransportErrorKind::Connection
    };
    TransportError::new(kind, err.to_string())
}
