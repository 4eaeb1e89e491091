//! Multi-project runs.
//!
//! Every project gets exactly one [`DeltaResult`], in input order, whatever
//! happens to its neighbours. Up to `concurrency` projects are in flight at
//! once over the shared transport.

use futures::stream::{self, LocalBoxStream, StreamExt};
use refdelta_core::{DeltaError, DeltaOutcome, DeltaResult, ProjectHandle, Transport};

use crate::collector::DEFAULT_PAGE_SIZE;
use crate::delta::{DateFilter, DeltaFinder};

/// Default number of projects compared at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Tuning for a multi-project run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Projects in flight at once; `0` is treated as `1`.
    pub concurrency: usize,
    /// Commit listing page size.
    pub page_size: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn validate(projects: &[ProjectHandle], base: &str, target: &str) -> Result<(), DeltaError> {
    if projects.is_empty() {
        return Err(DeltaError::InvalidInput("no projects to search".into()));
    }
    if base.trim().is_empty() {
        return Err(DeltaError::InvalidInput("base reference is empty".into()));
    }
    if target.trim().is_empty() {
        return Err(DeltaError::InvalidInput("target reference is empty".into()));
    }
    Ok(())
}

fn log_progress(position: usize, total: usize, result: &DeltaResult) {
    let path = result.project_path.as_str();
    match result.outcome() {
        DeltaOutcome::Changed => tracing::info!(
            "[{position}/{total}] {path}: {} commits ({} before date filter)",
            result.commits.len(),
            result.raw_delta_count
        ),
        DeltaOutcome::Failed => tracing::error!(
            "[{position}/{total}] {path}: {}",
            result.error.as_deref().unwrap_or_default()
        ),
        DeltaOutcome::Skipped => tracing::warn!(
            "[{position}/{total}] {path}: skipped, {}",
            result.error.as_deref().unwrap_or_default()
        ),
        DeltaOutcome::Unchanged if result.compare_same_ref => {
            tracing::info!("[{position}/{total}] {path}: references are identical")
        }
        DeltaOutcome::Unchanged => tracing::info!("[{position}/{total}] {path}: no commits"),
    }
}

/// Run the comparison over `projects`, yielding results in input order.
///
/// Dropping the stream cancels whatever is in flight; results already
/// yielded are unaffected.
///
/// # Errors
///
/// Returns [`DeltaError::InvalidInput`] for an empty project list or an
/// empty reference name. Nothing per-project is ever an error here.
pub fn stream_deltas<'a, T: Transport + ?Sized>(
    transport: &'a T,
    projects: &'a [ProjectHandle],
    base: &'a str,
    target: &'a str,
    filter: &'a DateFilter,
    options: RunOptions,
) -> Result<LocalBoxStream<'a, DeltaResult>, DeltaError> {
    validate(projects, base, target)?;

    let total = projects.len();
    let page_size = options.page_size;
    tracing::info!(
        projects = total,
        concurrency = options.concurrency.max(1),
        "searching for commits in {target} but not in {base}"
    );

    let results = stream::iter(projects.iter().enumerate())
        .map(move |(index, project)| async move {
            let result = DeltaFinder::new(transport)
                .with_page_size(page_size)
                .compute_delta(project, base, target, filter)
                .await;
            log_progress(index + 1, total, &result);
            result
        })
        .buffered(options.concurrency.max(1))
        .boxed_local();
    Ok(results)
}

/// Run the comparison over `projects` to completion.
///
/// # Examples
///
/// ```
/// use refdelta_core::ProjectHandle;
/// use refdelta_engine::delta::DateFilter;
/// use refdelta_engine::memory::{commit, MemoryTransport};
/// use refdelta_engine::orchestrator::{find_deltas, RunOptions};
///
/// let c1 = commit("C1", "alice", "2025-07-01T00:00:00Z");
/// let transport = MemoryTransport::new()
///     .with_tag(1, "v1", vec![c1.clone()])
///     .with_tag(1, "v2", vec![commit("C2", "bob", "2025-08-01T00:00:00Z"), c1]);
/// let projects = vec![
///     ProjectHandle::new(1, "api", "platform/api", ""),
///     ProjectHandle::new(2, "web", "platform/web", ""),
/// ];
///
/// let results = futures::executor::block_on(find_deltas(
///     &transport, &projects, "v1", "v2", &DateFilter::default(), RunOptions::default(),
/// ))
/// .unwrap();
/// assert_eq!(results.len(), 2);
/// assert!(results[0].has_changes());
/// assert!(results[1].error.is_some());
/// ```
///
/// # Errors
///
/// Same as [`stream_deltas`].
pub async fn find_deltas<T: Transport + ?Sized>(
    transport: &T,
    projects: &[ProjectHandle],
    base: &str,
    target: &str,
    filter: &DateFilter,
    options: RunOptions,
) -> Result<Vec<DeltaResult>, DeltaError> {
    let results = stream_deltas(transport, projects, base, target, filter, options)?;
    Ok(results.collect().await)
}
