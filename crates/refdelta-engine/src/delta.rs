//! The delta engine: commits reachable from a target reference but not
//! from a base reference, for one project.
//!
//! The delta is a plain set difference over commit hashes. No graph walk
//! or merge base is involved, so the answer is exact for any history shape
//! (merges, cherry-picks, rebased branches).

use std::cmp::{Ordering, Reverse};

use chrono::{DateTime, FixedOffset};
use refdelta_core::{
    CommitRecord, CommitWindow, DeltaError, DeltaResult, ProjectHandle, Transport, TransportError,
};

use crate::collector::{collect, ReachableSet, DEFAULT_PAGE_SIZE};
use crate::refs::{resolve_ref, RefLookup};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    raw: String,
    instant: Option<DateTime<FixedOffset>>,
}

impl Bound {
    fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            instant: DateTime::parse_from_rfc3339(raw).ok(),
        }
    }

    /// Order `timestamp` against this bound. Instants are compared when both
    /// sides parse; otherwise the raw strings are.
    fn cmp_timestamp(&self, timestamp: &str) -> Ordering {
        match (DateTime::parse_from_rfc3339(timestamp), self.instant) {
            (Ok(ts), Some(bound)) => ts.cmp(&bound),
            _ => timestamp.cmp(self.raw.as_str()),
        }
    }
}

/// Inclusive committed-date window applied to the delta.
///
/// Bounds are ISO-8601 timestamps. A commit without a committed date is
/// always admitted.
///
/// # Examples
///
/// ```
/// use refdelta_engine::delta::DateFilter;
///
/// let filter = DateFilter::parse(Some("2025-09-01T00:00:00Z"), None).unwrap();
/// assert!(filter.admits("2025-09-15T08:00:00Z"));
/// assert!(filter.admits("2025-09-01T00:00:00Z"));
/// assert!(!filter.admits("2025-08-31T23:59:59Z"));
/// assert!(filter.admits(""));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFilter {
    after: Option<Bound>,
    before: Option<Bound>,
}

impl DateFilter {
    /// Build a filter without validating the bounds.
    pub fn new(after: Option<&str>, before: Option<&str>) -> Self {
        Self {
            after: after.map(Bound::new),
            before: before.map(Bound::new),
        }
    }

    /// Build a filter from user input.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::InvalidInput`] if a bound is not RFC 3339 or if
    /// `after` is later than `before`.
    pub fn parse(after: Option<&str>, before: Option<&str>) -> Result<Self, DeltaError> {
        let filter = Self::new(after, before);
        for (flag, bound) in [("after", &filter.after), ("before", &filter.before)] {
            if let Some(b) = bound {
                if b.instant.is_none() {
                    return Err(DeltaError::InvalidInput(format!(
                        "--{flag} '{}' is not an RFC 3339 timestamp (e.g. 2025-09-01T00:00:00Z)",
                        b.raw
                    )));
                }
            }
        }
        if let (Some(a), Some(b)) = (&filter.after, &filter.before) {
            if a.instant > b.instant {
                return Err(DeltaError::InvalidInput(format!(
                    "--after '{}' is later than --before '{}'",
                    a.raw, b.raw
                )));
            }
        }
        Ok(filter)
    }

    /// `true` when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.after.is_none() && self.before.is_none()
    }

    /// Lower bound as given.
    pub fn after(&self) -> Option<&str> {
        self.after.as_ref().map(|b| b.raw.as_str())
    }

    /// Upper bound as given.
    pub fn before(&self) -> Option<&str> {
        self.before.as_ref().map(|b| b.raw.as_str())
    }

    /// Whether a commit with this committed date survives the filter.
    pub fn admits(&self, committed_date: &str) -> bool {
        if committed_date.is_empty() {
            return true;
        }
        let after_ok = self
            .after
            .as_ref()
            .map_or(true, |b| b.cmp_timestamp(committed_date) != Ordering::Less);
        let before_ok = self
            .before
            .as_ref()
            .map_or(true, |b| b.cmp_timestamp(committed_date) != Ordering::Greater);
        after_ok && before_ok
    }
}

/// Commits in `target` whose hash is absent from `base`, unordered.
///
/// # Examples
///
/// ```
/// use refdelta_engine::collector::ReachableSet;
/// use refdelta_engine::delta::diff_sets;
/// use refdelta_engine::memory::commit;
///
/// let day = "2025-01-01T00:00:00Z";
/// let (a, b, c) = (commit("A", "a", day), commit("B", "b", day), commit("C", "c", day));
/// let target = ReachableSet::from_commits(1, "v2", vec![a, b.clone(), c.clone()]);
/// let base = ReachableSet::from_commits(1, "v1", vec![b, c]);
/// let delta = diff_sets(&target, &base);
/// assert_eq!(delta.len(), 1);
/// assert_eq!(delta[0].id, "A");
/// ```
pub fn diff_sets(target: &ReachableSet, base: &ReachableSet) -> Vec<CommitRecord> {
    target
        .commits()
        .filter(|c| !base.contains(&c.id))
        .cloned()
        .collect()
}

/// Newest first by committed date; equal dates fall back to commit id so
/// the order never depends on map iteration.
pub fn sort_newest_first(commits: &mut [CommitRecord]) {
    commits.sort_by_cached_key(|c| {
        (
            Reverse(DateTime::parse_from_rfc3339(&c.committed_date).ok()),
            Reverse(c.committed_date.clone()),
            c.id.clone(),
        )
    });
}

fn describe(err: &TransportError) -> String {
    if err.is_not_found() {
        format!("Resource not found: {}", err.message)
    } else {
        format!("API error: {err}")
    }
}

/// Computes per-project deltas against a shared transport.
pub struct DeltaFinder<'a, T: Transport + ?Sized> {
    transport: &'a T,
    page_size: u32,
}

impl<'a, T: Transport + ?Sized> DeltaFinder<'a, T> {
    /// A finder using the default page size.
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the commit listing page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Compare `base` and `target` in one project.
    ///
    /// Never fails: missing references and transport errors are recorded
    /// on the returned result along with whatever was already counted.
    ///
    /// # Examples
    ///
    /// ```
    /// use refdelta_core::ProjectHandle;
    /// use refdelta_engine::delta::{DateFilter, DeltaFinder};
    /// use refdelta_engine::memory::{commit, MemoryTransport};
    ///
    /// let c1 = commit("C1", "alice", "2025-07-01T00:00:00Z");
    /// let c2 = commit("C2", "bob", "2025-08-01T00:00:00Z");
    /// let transport = MemoryTransport::new()
    ///     .with_tag(1, "v1.0.0", vec![c1.clone()])
    ///     .with_tag(1, "v2.0.0", vec![c2, c1]);
    /// let project = ProjectHandle::new(1, "api", "platform/api", "");
    ///
    /// let finder = DeltaFinder::new(&transport);
    /// let filter = DateFilter::default();
    /// let result = futures::executor::block_on(
    ///     finder.compute_delta(&project, "v1.0.0", "v2.0.0", &filter),
    /// );
    /// assert_eq!(result.commits.len(), 1);
    /// assert_eq!(result.commits[0].id, "C2");
    /// ```
    pub async fn compute_delta(
        &self,
        project: &ProjectHandle,
        base: &str,
        target: &str,
        filter: &DateFilter,
    ) -> DeltaResult {
        let mut result = DeltaResult::new(project, base, target);

        match resolve_ref(self.transport, project.id, base).await {
            RefLookup::Found(_) => result.base_exists = true,
            lookup => {
                result.error = Some(unresolved("Base", base, lookup));
                return result;
            }
        }
        match resolve_ref(self.transport, project.id, target).await {
            RefLookup::Found(_) => result.target_exists = true,
            lookup => {
                result.error = Some(unresolved("Target", target, lookup));
                return result;
            }
        }

        if let Err(e) = self.fill(&mut result, project, base, target, filter).await {
            tracing::error!(
                project = %project.path_with_namespace,
                "delta computation failed: {e}"
            );
            result.error = Some(describe(&e));
        }
        result
    }

    async fn fill(
        &self,
        result: &mut DeltaResult,
        project: &ProjectHandle,
        base: &str,
        target: &str,
        filter: &DateFilter,
    ) -> Result<(), TransportError> {
        // The full histories are needed for an exact difference, so the
        // date filter is applied locally rather than sent to the host.
        let window = CommitWindow::default();

        let (transport, page_size) = (self.transport, self.page_size);
        let target_set = collect(transport, project.id, target, &window, page_size).await?;
        result.target_commit_count = target_set.len();
        let base_set = collect(transport, project.id, base, &window, page_size).await?;
        result.base_commit_count = base_set.len();

        let delta = diff_sets(&target_set, &base_set);
        result.compare_same_ref = delta.is_empty() && target_set.hashes() == base_set.hashes();
        result.raw_delta_count = delta.len();

        let mut commits: Vec<CommitRecord> = delta
            .into_iter()
            .filter(|c| filter.admits(&c.committed_date))
            .collect();
        sort_newest_first(&mut commits);
        result.commits = commits;
        Ok(())
    }
}

fn unresolved(which: &str, name: &str, lookup: RefLookup) -> String {
    match lookup {
        RefLookup::Inconclusive(e) => format!("{which} ref '{name}' could not be verified: {e}"),
        _ => format!("{which} ref '{name}' not found in this project"),
    }
}
