//! The seam between the delta engine and the remote host.
//!
//! Everything the engine needs from GitLab goes through [`Transport`]. The
//! real implementation lives in `refdelta-gitlab`; tests substitute an
//! in-memory one.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::CommitRecord;

/// Classification of a failed remote call.
///
/// # Examples
///
/// ```
/// use refdelta_core::TransportErrorKind;
///
/// assert_eq!(TransportErrorKind::from_status(404), TransportErrorKind::NotFound);
/// assert_eq!(TransportErrorKind::from_status(429), TransportErrorKind::RateLimited);
/// assert_eq!(TransportErrorKind::from_status(502), TransportErrorKind::Http(502));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// 404: the resource does not exist (or is invisible to this token).
    NotFound,
    /// 401: the token was rejected.
    Unauthorized,
    /// 403: the token lacks permission.
    Forbidden,
    /// 429: retries were exhausted against the rate limiter.
    RateLimited,
    /// Any other non-success status.
    Http(u16),
    /// The request did not complete within the client timeout.
    Timeout,
    /// DNS, TLS, or socket failure.
    Connection,
    /// The response body was not what the endpoint documents.
    Malformed,
}

impl TransportErrorKind {
    /// Map an HTTP status code to an error kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => TransportErrorKind::Unauthorized,
            403 => TransportErrorKind::Forbidden,
            404 => TransportErrorKind::NotFound,
            429 => TransportErrorKind::RateLimited,
            other => TransportErrorKind::Http(other),
        }
    }

    /// Whether a retry might succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            TransportErrorKind::RateLimited
                | TransportErrorKind::Timeout
                | TransportErrorKind::Connection
                | TransportErrorKind::Http(500 | 502 | 503 | 504)
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::NotFound => write!(f, "not found"),
            TransportErrorKind::Unauthorized => write!(f, "unauthorized"),
            TransportErrorKind::Forbidden => write!(f, "forbidden"),
            TransportErrorKind::RateLimited => write!(f, "rate limited"),
            TransportErrorKind::Http(status) => write!(f, "HTTP {status}"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connection => write!(f, "connection failed"),
            TransportErrorKind::Malformed => write!(f, "malformed response"),
        }
    }
}

/// A failed remote call, tagged so callers can tell "absent" from "broken".
///
/// # Examples
///
/// ```
/// use refdelta_core::{TransportError, TransportErrorKind};
///
/// let err = TransportError::new(TransportErrorKind::NotFound, "tags/v9.9.9");
/// assert!(err.is_not_found());
/// assert_eq!(err.to_string(), "not found: tags/v9.9.9");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Detail from the host or the client.
    pub message: String,
}

impl TransportError {
    /// Create a new error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a 404-class error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    /// `true` when the host said the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind == TransportErrorKind::NotFound
    }
}

/// Optional host-side time window for commit listing.
///
/// Both bounds are ISO-8601 timestamps handed to the host verbatim.
///
/// # Examples
///
/// ```
/// use refdelta_core::CommitWindow;
///
/// let window = CommitWindow::default();
/// assert!(window.is_unbounded());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitWindow {
    /// Only commits after this timestamp.
    pub since: Option<String>,
    /// Only commits before this timestamp.
    pub until: Option<String>,
}

impl CommitWindow {
    /// `true` when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }
}

/// One page of a commit listing.
#[derive(Debug, Clone, Default)]
pub struct CommitPage {
    /// Commits on this page, in host order.
    pub commits: Vec<CommitRecord>,
    /// Page number to request next, if the host reported one.
    pub next_page: Option<u32>,
}

/// Whether a [`CommitRef`] names a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitRefKind {
    /// A branch head reaches the commit.
    Branch,
    /// A tag reaches the commit.
    Tag,
}

/// A branch or tag whose history contains a given commit.
///
/// Deserializes from GitLab's `commits/:sha/refs` items.
///
/// # Examples
///
/// ```
/// use refdelta_core::{CommitRef, CommitRefKind};
///
/// let r: CommitRef = serde_json::from_str(r#"{"type": "tag", "name": "v1.2.0"}"#).unwrap();
/// assert_eq!(r.kind, CommitRefKind::Tag);
/// assert_eq!(r.name, "v1.2.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRef {
    /// Branch or tag.
    #[serde(rename = "type")]
    pub kind: CommitRefKind,
    /// Ref name.
    pub name: String,
}

/// Read-only access to a GitLab-like host.
///
/// Implementations own retries, backoff, timeouts and auth. A "does not
/// exist" answer must come back as a [`TransportError`] whose kind is
/// [`TransportErrorKind::NotFound`]; anything else is treated as a failure.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look up a tag by name.
    async fn get_tag(&self, project_id: u64, name: &str) -> Result<(), TransportError>;

    /// Look up a branch by name.
    async fn get_branch(&self, project_id: u64, name: &str) -> Result<(), TransportError>;

    /// Look up a commit by hash (full or abbreviated).
    async fn get_commit(&self, project_id: u64, sha: &str) -> Result<CommitRecord, TransportError>;

    /// List the branches and tags whose history contains `sha`.
    async fn list_commit_refs(
        &self,
        project_id: u64,
        sha: &str,
    ) -> Result<Vec<CommitRef>, TransportError>;

    /// Fetch one page of the commits reachable from `ref_name`.
    async fn list_commits_page(
        &self,
        project_id: u64,
        ref_name: &str,
        window: &CommitWindow,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage, TransportError>;
}
