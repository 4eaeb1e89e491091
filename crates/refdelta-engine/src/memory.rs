//! An in-memory [`Transport`] for tests and dry runs.
//!
//! Each project holds named references, each with the list of commits
//! reachable from it. Listings are paginated exactly like the host does,
//! so the collector's page loop is exercised too.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use refdelta_core::{
    CommitPage, CommitRecord, CommitRef, CommitRefKind, CommitWindow, Transport, TransportError,
};

/// Build a minimal commit record.
///
/// # Examples
///
/// ```
/// use refdelta_engine::memory::commit;
///
/// let c = commit("abc123", "alice", "2025-09-15T12:00:00Z");
/// assert_eq!(c.short_id, "abc123");
/// assert_eq!(c.title, "commit abc123");
/// ```
pub fn commit(id: &str, author: &str, committed_date: &str) -> CommitRecord {
    CommitRecord {
        id: id.to_string(),
        short_id: id.chars().take(8).collect(),
        title: format!("commit {id}"),
        message: format!("commit {id}\n"),
        author_name: author.to_string(),
        author_email: format!("{}@example.com", author.to_lowercase()),
        authored_date: committed_date.to_string(),
        committed_date: committed_date.to_string(),
        committer_name: author.to_string(),
        committer_email: format!("{}@example.com", author.to_lowercase()),
        parent_ids: Vec::new(),
        web_url: format!("https://gitlab.example.com/-/commit/{id}"),
    }
}

#[derive(Debug, Default)]
struct ProjectState {
    tags: HashSet<String>,
    branches: HashSet<String>,
    history: HashMap<String, Vec<CommitRecord>>,
    lookup_failure: Option<TransportError>,
    listing_failures: HashMap<String, TransportError>,
    ref_listing_failure: Option<TransportError>,
}

fn in_window(window: &CommitWindow, date: &str) -> bool {
    let after_since = window.since.as_deref().map_or(true, |s| date >= s);
    let before_until = window.until.as_deref().map_or(true, |u| date <= u);
    after_since && before_until
}

fn is_commit(commit: &CommitRecord, sha: &str) -> bool {
    commit.id == sha || commit.short_id == sha
}

impl ProjectState {
    fn find_commit(&self, sha: &str) -> Option<&CommitRecord> {
        self.history.values().flatten().find(|c| is_commit(c, sha))
    }

    fn reaches(&self, ref_name: &str, sha: &str) -> bool {
        self.history
            .get(ref_name)
            .map_or(false, |h| h.iter().any(|c| is_commit(c, sha)))
    }

    /// Sorted names from `names` whose history contains `sha`.
    fn containing(&self, names: &HashSet<String>, sha: &str) -> Vec<String> {
        let mut hits: Vec<String> = names
            .iter()
            .filter(|name| self.reaches(name, sha))
            .cloned()
            .collect();
        hits.sort();
        hits
    }
}

/// Fixed remote state keyed by project id.
///
/// Unknown projects answer 404 to everything.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    projects: HashMap<u64, ProjectState>,
    lookups: AtomicUsize,
    page_requests: AtomicUsize,
}

impl MemoryTransport {
    /// An empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag whose history is `reachable`.
    pub fn with_tag(mut self, project_id: u64, name: &str, reachable: Vec<CommitRecord>) -> Self {
        let state = self.projects.entry(project_id).or_default();
        state.tags.insert(name.to_string());
        state.history.insert(name.to_string(), reachable);
        self
    }

    /// Add a branch whose history is `reachable`.
    pub fn with_branch(
        mut self,
        project_id: u64,
        name: &str,
        reachable: Vec<CommitRecord>,
    ) -> Self {
        let state = self.projects.entry(project_id).or_default();
        state.branches.insert(name.to_string());
        state.history.insert(name.to_string(), reachable);
        self
    }

    /// Make every tag/branch/commit lookup in a project fail with `err`.
    pub fn fail_lookups(mut self, project_id: u64, err: TransportError) -> Self {
        self.projects.entry(project_id).or_default().lookup_failure = Some(err);
        self
    }

    /// Make commit listing for one reference fail with `err`.
    pub fn fail_listing(mut self, project_id: u64, ref_name: &str, err: TransportError) -> Self {
        self.projects
            .entry(project_id)
            .or_default()
            .listing_failures
            .insert(ref_name.to_string(), err);
        self
    }

    /// Make listing the refs that contain a commit fail with `err`.
    pub fn fail_ref_listing(mut self, project_id: u64, err: TransportError) -> Self {
        let state = self.projects.entry(project_id).or_default();
        state.ref_listing_failure = Some(err);
        self
    }

    /// Tag, branch and commit lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Commit listing pages served so far.
    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::Relaxed)
    }

    fn lookup<R>(
        &self,
        project_id: u64,
        what: &str,
        name: &str,
        hit: impl Fn(&ProjectState) -> Option<R>,
    ) -> Result<R, TransportError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let not_found =
            || TransportError::not_found(format!("projects/{project_id}/{what}/{name}"));
        let state = self.projects.get(&project_id).ok_or_else(not_found)?;
        if let Some(err) = &state.lookup_failure {
            return Err(err.clone());
        }
        hit(state).ok_or_else(not_found)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_tag(&self, project_id: u64, name: &str) -> Result<(), TransportError> {
        self.lookup(project_id, "tags", name, |s| {
            s.tags.contains(name).then_some(())
        })
    }

    async fn get_branch(&self, project_id: u64, name: &str) -> Result<(), TransportError> {
        self.lookup(project_id, "branches", name, |s| {
            s.branches.contains(name).then_some(())
        })
    }

    async fn get_commit(&self, project_id: u64, sha: &str) -> Result<CommitRecord, TransportError> {
        self.lookup(project_id, "commits", sha, |s| {
            s.find_commit(sha).cloned()
        })
    }

    async fn list_commit_refs(
        &self,
        project_id: u64,
        sha: &str,
    ) -> Result<Vec<CommitRef>, TransportError> {
        let not_found =
            || TransportError::not_found(format!("projects/{project_id}/commits/{sha}"));
        let state = self.projects.get(&project_id).ok_or_else(not_found)?;
        if let Some(err) = &state.ref_listing_failure {
            return Err(err.clone());
        }
        if state.find_commit(sha).is_none() {
            return Err(not_found());
        }
        let branches = state
            .containing(&state.branches, sha)
            .into_iter()
            .map(|name| CommitRef {
                kind: CommitRefKind::Branch,
                name,
            });
        let tags = state
            .containing(&state.tags, sha)
            .into_iter()
            .map(|name| CommitRef {
                kind: CommitRefKind::Tag,
                name,
            });
        Ok(branches.chain(tags).collect())
    }

    async fn list_commits_page(
        &self,
        project_id: u64,
        ref_name: &str,
        window: &CommitWindow,
        page: u32,
        per_page: u32,
    ) -> Result<CommitPage, TransportError> {
        self.page_requests.fetch_add(1, Ordering::Relaxed);
        let state = self
            .projects
            .get(&project_id)
            .ok_or_else(|| TransportError::not_found(format!("projects/{project_id}")))?;
        if let Some(err) = state.listing_failures.get(ref_name) {
            return Err(err.clone());
        }

        let history: Vec<&CommitRecord> = match state.history.get(ref_name) {
            Some(h) => h.iter().collect(),
            None => state
                .history
                .values()
                .find(|h| h.iter().any(|c| c.id == ref_name))
                .map(|h| h.iter().skip_while(|c| c.id != ref_name).collect())
                .unwrap_or_default(),
        };
        let in_window: Vec<&CommitRecord> = history
            .into_iter()
            .filter(|c| in_window(window, &c.committed_date))
            .collect();

        let per_page = per_page.max(1) as usize;
        let start = (page.max(1) as usize - 1) * per_page;
        let commits: Vec<CommitRecord> = in_window
            .iter()
            .skip(start)
            .take(per_page)
            .map(|c| (*c).clone())
            .collect();
        let next_page = (start + per_page < in_window.len()).then_some(page + 1);
        Ok(CommitPage { commits, next_page })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_through_history() {
        let history: Vec<CommitRecord> = (0..5)
            .map(|i| commit(&format!("c{i}"), "alice", "2025-01-01T00:00:00Z"))
            .collect();
        let transport = MemoryTransport::new().with_branch(1, "main", history);
        let window = CommitWindow::default();

        let first = transport
            .list_commits_page(1, "main", &window, 1, 2)
            .await
            .unwrap();
        assert_eq!(first.commits.len(), 2);
        assert_eq!(first.next_page, Some(2));

        let last = transport
            .list_commits_page(1, "main", &window, 3, 2)
            .await
            .unwrap();
        assert_eq!(last.commits.len(), 1);
        assert_eq!(last.next_page, None);
        assert_eq!(transport.page_requests(), 2);
    }

    #[tokio::test]
    async fn commit_ref_lists_from_that_commit() {
        let history = vec![
            commit("c3", "alice", "2025-03-01T00:00:00Z"),
            commit("c2", "alice", "2025-02-01T00:00:00Z"),
            commit("c1", "alice", "2025-01-01T00:00:00Z"),
        ];
        let transport = MemoryTransport::new().with_branch(1, "main", history);
        let page = transport
            .list_commits_page(1, "c2", &CommitWindow::default(), 1, 100)
            .await
            .unwrap();
        let ids: Vec<&str> = page.commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn commit_lookup_returns_the_record() {
        let history = vec![commit("abcdef1234567890", "alice", "2025-01-01T00:00:00Z")];
        let transport = MemoryTransport::new().with_branch(1, "main", history);

        let found = transport.get_commit(1, "abcdef12").await.unwrap();
        assert_eq!(found.id, "abcdef1234567890");
        let missing = transport.get_commit(1, "ffff").await;
        assert!(missing.unwrap_err().is_not_found());
        assert_eq!(transport.lookups(), 2);
    }

    #[tokio::test]
    async fn refs_containing_a_commit() {
        let old = commit("c1", "alice", "2025-01-01T00:00:00Z");
        let new = commit("c2", "alice", "2025-02-01T00:00:00Z");
        let transport = MemoryTransport::new()
            .with_branch(1, "main", vec![new.clone(), old.clone()])
            .with_branch(1, "hotfix", vec![old.clone()])
            .with_tag(1, "v1", vec![old])
            .with_tag(1, "v2", vec![new]);

        let refs = transport.list_commit_refs(1, "c1").await.unwrap();
        let names: Vec<(CommitRefKind, &str)> =
            refs.iter().map(|r| (r.kind, r.name.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (CommitRefKind::Branch, "hotfix"),
                (CommitRefKind::Branch, "main"),
                (CommitRefKind::Tag, "v1"),
            ]
        );
        let missing = transport.list_commit_refs(1, "c9").await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn window_limits_listing() {
        let history = vec![
            commit("c2", "alice", "2025-09-15T00:00:00Z"),
            commit("c1", "alice", "2025-08-01T00:00:00Z"),
        ];
        let transport = MemoryTransport::new().with_tag(1, "v1", history);
        let window = CommitWindow {
            since: Some("2025-09-01T00:00:00Z".into()),
            until: None,
        };
        let page = transport
            .list_commits_page(1, "v1", &window, 1, 100)
            .await
            .unwrap();
        assert_eq!(page.commits.len(), 1);
        assert_eq!(page.commits[0].id, "c2");
    }
}
