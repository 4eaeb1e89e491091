//! Commit collection: everything reachable from one reference.
//!
//! Pages are requested until the host returns an empty page or stops
//! reporting a next page. Results are folded into a map keyed by commit
//! hash; a repeated hash overwrites the earlier entry.

use std::collections::{HashMap, HashSet};

use refdelta_core::{CommitRecord, CommitWindow, Transport, TransportError};

/// Default and largest commits per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// All commits reachable from one reference at fetch time.
///
/// # Examples
///
/// ```
/// use refdelta_engine::collector::ReachableSet;
/// use refdelta_engine::memory::commit;
///
/// let set = ReachableSet::from_commits(1, "main", vec![
///     commit("a", "alice", "2025-01-02T00:00:00Z"),
///     commit("b", "bob", "2025-01-01T00:00:00Z"),
/// ]);
/// assert_eq!(set.len(), 2);
/// assert!(set.contains("a"));
/// ```
#[derive(Debug, Clone)]
pub struct ReachableSet {
    /// Project the set was collected from.
    pub project_id: u64,
    /// Reference the set was collected from.
    pub ref_name: String,
    commits: HashMap<String, CommitRecord>,
}

impl ReachableSet {
    /// Fold `commits` into a set; later duplicates replace earlier ones.
    pub fn from_commits(
        project_id: u64,
        ref_name: &str,
        commits: impl IntoIterator<Item = CommitRecord>,
    ) -> Self {
        let mut set = Self {
            project_id,
            ref_name: ref_name.to_string(),
            commits: HashMap::new(),
        };
        set.extend(commits);
        set
    }

    fn extend(&mut self, commits: impl IntoIterator<Item = CommitRecord>) {
        for commit in commits {
            self.commits.insert(commit.id.clone(), commit);
        }
    }

    /// Number of distinct commits.
    pub fn len(&self) -> usize {
        self.commits.len()
    }

    /// `true` if nothing is reachable.
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// Whether `hash` is reachable.
    pub fn contains(&self, hash: &str) -> bool {
        self.commits.contains_key(hash)
    }

    /// Look up a reachable commit.
    pub fn get(&self, hash: &str) -> Option<&CommitRecord> {
        self.commits.get(hash)
    }

    /// The set of reachable hashes.
    pub fn hashes(&self) -> HashSet<&str> {
        self.commits.keys().map(String::as_str).collect()
    }

    /// Iterate over reachable commits in no particular order.
    pub fn commits(&self) -> impl Iterator<Item = &CommitRecord> {
        self.commits.values()
    }
}

/// Collect every commit reachable from `ref_name`.
///
/// `window` is forwarded to the host as-is; pass an unbounded window when
/// the result feeds a set difference. `page_size` is clamped to
/// `1..=DEFAULT_PAGE_SIZE`.
///
/// # Errors
///
/// The first [`TransportError`] aborts collection; no partial set is
/// returned.
pub async fn collect<T: Transport + ?Sized>(
    transport: &T,
    project_id: u64,
    ref_name: &str,
    window: &CommitWindow,
    page_size: u32,
) -> Result<ReachableSet, TransportError> {
    let mut set = ReachableSet::from_commits(project_id, ref_name, Vec::new());
    let page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
    let mut page = 1u32;

    loop {
        let batch = transport
            .list_commits_page(project_id, ref_name, window, page, page_size)
            .await?;
        tracing::debug!(
            project_id,
            reference = ref_name,
            page,
            commits = batch.commits.len(),
            "fetched commit page"
        );
        if batch.commits.is_empty() {
            break;
        }
        set.extend(batch.commits);
        match batch.next_page {
            Some(next) if next > page => page = next,
            _ => break,
        }
    }

    tracing::debug!(
        project_id,
        reference = ref_name,
        commits = set.len(),
        "collected reachable set"
    );
    Ok(set)
}
