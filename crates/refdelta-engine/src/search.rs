//! Commit search: which projects contain a commit, and on which branches
//! and tags.
//!
//! Every (commit, project) pair is looked up independently. A failed
//! lookup is recorded on its [`CommitMatch`] and the batch carries on.

use futures::stream::{self, StreamExt};
use refdelta_core::{
    CommitMatch, CommitRefKind, CommitSearchReport, DeltaError, ProjectHandle, Transport,
};

/// Read a commit list: one hash per line.
///
/// Surrounding whitespace is trimmed; blank lines and `#` comments are
/// skipped.
///
/// # Examples
///
/// ```
/// use refdelta_engine::search::parse_commit_list;
///
/// let shas = parse_commit_list("abc123\n\n  # hotfixes\n def456  \n");
/// assert_eq!(shas, vec!["abc123", "def456"]);
/// ```
pub fn parse_commit_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Trimmed, non-empty, first occurrence only.
fn distinct(shas: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for sha in shas.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !seen.iter().any(|s: &String| s == sha) {
            seen.push(sha.to_string());
        }
    }
    seen
}

fn commit_url(project: &ProjectHandle, web_url: String, sha: &str) -> String {
    if web_url.is_empty() {
        format!("{}/-/commit/{sha}", project.web_url.trim_end_matches('/'))
    } else {
        web_url
    }
}

/// Look for `sha` in one project.
///
/// Never fails: a clean miss comes back with `found == false` and no
/// error, anything else is recorded in `error`. When the commit exists
/// but its branches and tags cannot be listed, the entry stays found.
pub async fn find_commit<T: Transport + ?Sized>(
    transport: &T,
    project: &ProjectHandle,
    sha: &str,
) -> CommitMatch {
    let mut entry = CommitMatch::new(project, sha);
    let commit = match transport.get_commit(project.id, sha).await {
        Ok(commit) => commit,
        Err(e) if e.is_not_found() => return entry,
        Err(e) => {
            tracing::warn!(
                project = %project.path_with_namespace,
                sha,
                "commit lookup failed: {e}"
            );
            entry.error = Some(e.to_string());
            return entry;
        }
    };

    entry.found = true;
    entry.commit_web_url = commit_url(project, commit.web_url, sha);
    entry.title = commit.title;
    entry.author_name = commit.author_name;
    entry.author_email = commit.author_email;
    entry.committed_date = commit.committed_date;

    match transport.list_commit_refs(project.id, sha).await {
        Ok(refs) => {
            for r in refs {
                match r.kind {
                    CommitRefKind::Branch => entry.branches.push(r.name),
                    CommitRefKind::Tag => entry.tags.push(r.name),
                }
            }
            entry.branches.sort();
            entry.tags.sort();
        }
        Err(e) => {
            tracing::warn!(
                project = %project.path_with_namespace,
                sha,
                "listing refs failed: {e}"
            );
            entry.error = Some(format!("could not list branches and tags: {e}"));
        }
    }
    entry
}

/// Search every project for every commit in `shas`.
///
/// Hashes are trimmed and deduplicated; blanks are dropped. Up to
/// `concurrency` lookups run at once. Clean misses are left out of
/// [`CommitSearchReport::matches`]; hits and failures are kept.
///
/// # Examples
///
/// ```
/// use refdelta_core::ProjectHandle;
/// use refdelta_engine::memory::{commit, MemoryTransport};
/// use refdelta_engine::search::search_commits;
///
/// let transport = MemoryTransport::new()
///     .with_branch(1, "main", vec![commit("abc123", "alice", "2025-07-01T00:00:00Z")]);
/// let projects = vec![
///     ProjectHandle::new(1, "api", "platform/api", ""),
///     ProjectHandle::new(2, "web", "platform/web", ""),
/// ];
/// let shas = vec!["abc123".to_string(), "fff000".to_string()];
///
/// let report = futures::executor::block_on(search_commits(&transport, &projects, &shas, 4))
///     .unwrap();
/// assert_eq!(report.found, vec!["abc123"]);
/// assert_eq!(report.not_found, vec!["fff000"]);
/// assert_eq!(report.matches[0].branches, vec!["main"]);
/// ```
///
/// # Errors
///
/// Returns [`DeltaError::InvalidInput`] when there are no projects or no
/// non-blank hashes. Nothing per-lookup is ever an error here.
pub async fn search_commits<T: Transport + ?Sized>(
    transport: &T,
    projects: &[ProjectHandle],
    shas: &[String],
    concurrency: usize,
) -> Result<CommitSearchReport, DeltaError> {
    if projects.is_empty() {
        return Err(DeltaError::InvalidInput("no projects to search".into()));
    }
    let shas = distinct(shas);
    if shas.is_empty() {
        return Err(DeltaError::InvalidInput("no commits to search for".into()));
    }
    tracing::info!(
        commits = shas.len(),
        projects = projects.len(),
        "searching for commits"
    );

    let pairs = shas
        .iter()
        .flat_map(move |sha| projects.iter().map(move |project| (sha, project)));
    let entries: Vec<CommitMatch> = stream::iter(pairs)
        .map(|(sha, project)| find_commit(transport, project, sha))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = CommitSearchReport {
        commits_searched: shas.len(),
        projects_searched: projects.len(),
        ..CommitSearchReport::default()
    };
    let total = shas.len();
    let mut entries = entries.into_iter();
    for (index, sha) in shas.into_iter().enumerate() {
        let per_sha: Vec<CommitMatch> = entries.by_ref().take(projects.len()).collect();
        let hits = per_sha.iter().filter(|m| m.found).count();
        if hits > 0 {
            tracing::info!("[{}/{total}] {sha}: found in {hits} project(s)", index + 1);
            report.found.push(sha);
        } else {
            tracing::info!("[{}/{total}] {sha}: not found in any project", index + 1);
            report.not_found.push(sha);
        }
        report
            .matches
            .extend(per_sha.into_iter().filter(CommitMatch::is_reportable));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{commit, MemoryTransport};
    use refdelta_core::{TransportError, TransportErrorKind};

    fn project(id: u64, path: &str) -> ProjectHandle {
        ProjectHandle::new(
            id,
            path.rsplit('/').next().unwrap_or(path),
            path,
            format!("https://gitlab.example.com/{path}"),
        )
    }

    fn transport() -> MemoryTransport {
        let old = commit("c1", "alice", "2025-01-01T00:00:00Z");
        let new = commit("c2", "bob", "2025-02-01T00:00:00Z");
        MemoryTransport::new()
            .with_branch(1, "main", vec![new.clone(), old.clone()])
            .with_branch(1, "develop", vec![new, old.clone()])
            .with_tag(1, "v1.0", vec![old])
    }

    fn server_error() -> TransportError {
        TransportError::new(TransportErrorKind::Http(500), "internal error")
    }

    #[test]
    fn commit_list_skips_blanks_and_comments() {
        let shas = parse_commit_list("# release 2.0\nc1\n\n   \n  c2\r\n");
        assert_eq!(shas, vec!["c1", "c2"]);
    }

    #[test]
    fn distinct_keeps_first_occurrence() {
        let shas: Vec<String> = ["c2", " c1 ", "", "c2", "c1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(distinct(&shas), vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn hit_lists_branches_and_tags() {
        let transport = transport();
        let entry = find_commit(&transport, &project(1, "platform/api"), "c1").await;

        assert!(entry.found);
        assert_eq!(entry.error, None);
        assert_eq!(entry.branches, vec!["develop", "main"]);
        assert_eq!(entry.tags, vec!["v1.0"]);
        assert_eq!(entry.author_name, "alice");
        assert_eq!(entry.title, "commit c1");
        assert_eq!(
            entry.commit_web_url,
            "https://gitlab.example.com/-/commit/c1"
        );
    }

    #[tokio::test]
    async fn missing_commit_is_a_clean_miss() {
        let transport = transport();
        let entry = find_commit(&transport, &project(1, "platform/api"), "c9").await;

        assert!(!entry.found);
        assert_eq!(entry.error, None);
        assert!(!entry.is_reportable());
    }

    #[tokio::test]
    async fn lookup_failure_is_recorded() {
        let transport = transport().fail_lookups(1, server_error());
        let entry = find_commit(&transport, &project(1, "platform/api"), "c1").await;

        assert!(!entry.found);
        assert_eq!(entry.error.as_deref(), Some("HTTP 500: internal error"));
    }

    #[tokio::test]
    async fn ref_listing_failure_keeps_the_hit() {
        let transport = transport().fail_ref_listing(1, server_error());
        let entry = find_commit(&transport, &project(1, "platform/api"), "c2").await;

        assert!(entry.found);
        assert!(entry.branches.is_empty());
        let error = entry.error.unwrap();
        assert!(error.starts_with("could not list branches and tags"));
    }

    #[tokio::test]
    async fn missing_web_url_is_built_from_the_project() {
        let mut bare = commit("c7", "carol", "2025-03-01T00:00:00Z");
        bare.web_url.clear();
        let transport = MemoryTransport::new().with_branch(3, "main", vec![bare]);

        let entry = find_commit(&transport, &project(3, "platform/web"), "c7").await;

        assert_eq!(
            entry.commit_web_url,
            "https://gitlab.example.com/platform/web/-/commit/c7"
        );
    }

    #[tokio::test]
    async fn batch_survives_failing_projects() {
        let transport = transport().fail_lookups(2, server_error());
        let projects = vec![
            project(1, "platform/api"),
            project(2, "platform/broken"),
            project(3, "platform/empty"),
        ];
        let shas: Vec<String> = ["c1", " ", "c9", "c1 "]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = search_commits(&transport, &projects, &shas, 2)
            .await
            .unwrap();

        assert_eq!(report.commits_searched, 2);
        assert_eq!(report.projects_searched, 3);
        assert_eq!(report.found, vec!["c1"]);
        assert_eq!(report.not_found, vec!["c9"]);
        assert_eq!(report.errors(), 2);
        let rows: Vec<(&str, &str, bool)> = report
            .matches
            .iter()
            .map(|m| (m.commit_sha.as_str(), m.project_path.as_str(), m.found))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("c1", "platform/api", true),
                ("c1", "platform/broken", false),
                ("c9", "platform/broken", false),
            ]
        );
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected() {
        let transport = transport();
        let projects = vec![project(1, "platform/api")];

        let err = search_commits(&transport, &[], &["c1".to_string()], 4).await;
        assert!(matches!(err, Err(DeltaError::InvalidInput(_))));

        let err = search_commits(&transport, &projects, &[" ".to_string()], 4).await;
        assert!(matches!(err, Err(DeltaError::InvalidInput(_))));
    }
}
