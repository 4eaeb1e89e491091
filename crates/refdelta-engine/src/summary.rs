//! Run-level statistics derived from per-project results.

use std::collections::BTreeSet;

use refdelta_core::{DeltaOutcome, DeltaResult, DeltaSummary, ProjectCommitCount, TOP_PROJECTS};

/// Reduce `results` into a [`DeltaSummary`].
///
/// Every project lands in exactly one of with-changes, with-errors, or
/// without-changes. Reference names are taken from the first result.
///
/// # Examples
///
/// ```
/// use refdelta_engine::summary::summarize;
///
/// let summary = summarize(&[]);
/// assert_eq!(summary.total_projects, 0);
/// assert!(summary.base_ref.is_empty());
/// ```
pub fn summarize(results: &[DeltaResult]) -> DeltaSummary {
    let mut summary = DeltaSummary {
        total_projects: results.len(),
        ..DeltaSummary::default()
    };
    let Some(first) = results.first() else {
        return summary;
    };
    summary.base_ref = first.base_ref.clone();
    summary.target_ref = first.target_ref.clone();

    let mut authors = BTreeSet::new();
    let mut ranked = Vec::new();

    for result in results {
        summary.total_base_commits += result.base_commit_count;
        summary.total_target_commits += result.target_commit_count;
        summary.total_commits += result.commits.len();
        summary.total_raw_delta += result.raw_delta_count;

        match result.outcome() {
            DeltaOutcome::Changed => {
                summary.projects_with_changes += 1;
                ranked.push(ProjectCommitCount {
                    project_path: result.project_path.clone(),
                    commits: result.commits.len(),
                });
            }
            DeltaOutcome::Failed => summary.projects_with_errors += 1,
            DeltaOutcome::Skipped => {
                summary.projects_with_errors += 1;
                summary.projects_skipped += 1;
            }
            DeltaOutcome::Unchanged => summary.projects_without_changes += 1,
        }

        authors.extend(result.commits.iter().map(|c| c.author_name.clone()));
    }

    ranked.sort_by(|a, b| {
        b.commits
            .cmp(&a.commits)
            .then_with(|| a.project_path.cmp(&b.project_path))
    });
    ranked.truncate(TOP_PROJECTS);

    summary.unique_authors = authors.into_iter().collect();
    summary.top_projects = ranked;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::commit;
    use refdelta_core::ProjectHandle;

    fn result(id: u64, path: &str, authors: &[&str]) -> DeltaResult {
        let project = ProjectHandle::new(id, path, path, "");
        let mut r = DeltaResult::new(&project, "v1", "v2");
        r.base_exists = true;
        r.target_exists = true;
        r.commits = authors
            .iter()
            .enumerate()
            .map(|(i, a)| commit(&format!("{path}-{i}"), a, "2025-01-01T00:00:00Z"))
            .collect();
        r.raw_delta_count = r.commits.len() + 1;
        r.base_commit_count = 10;
        r.target_commit_count = 10 + r.raw_delta_count;
        r
    }

    #[test]
    fn classes_are_exclusive() {
        let changed = result(1, "g/a", &["alice", "bob"]);
        let unchanged = result(2, "g/b", &[]);
        let mut failed = result(3, "g/c", &[]);
        failed.error = Some("API error: HTTP 500: boom".into());
        let mut skipped = result(4, "g/d", &[]);
        skipped.target_exists = false;
        skipped.error = Some("Target ref 'v2' not found in this project".into());

        let summary = summarize(&[changed, unchanged, failed, skipped]);
        assert_eq!(summary.total_projects, 4);
        assert_eq!(summary.projects_with_changes, 1);
        assert_eq!(summary.projects_without_changes, 1);
        assert_eq!(summary.projects_with_errors, 2);
        assert_eq!(summary.projects_skipped, 1);
        assert_eq!(
            summary.projects_with_changes
                + summary.projects_without_changes
                + summary.projects_with_errors,
            summary.total_projects
        );
        assert_eq!(summary.base_ref, "v1");
        assert_eq!(summary.target_ref, "v2");
    }

    #[test]
    fn totals_and_authors() {
        let summary = summarize(&[
            result(1, "g/a", &["carol", "alice"]),
            result(2, "g/b", &["alice"]),
        ]);
        assert_eq!(summary.total_commits, 3);
        assert_eq!(summary.total_raw_delta, 5);
        assert_eq!(summary.total_base_commits, 20);
        assert_eq!(summary.total_target_commits, 25);
        assert_eq!(summary.unique_authors, vec!["alice", "carol"]);
    }

    #[test]
    fn top_projects_ranked_and_capped() {
        let results: Vec<DeltaResult> = (0..12u64)
            .map(|i| {
                let authors = vec!["alice"; (i % 4) as usize + 1];
                result(i, &format!("g/p{i:02}"), &authors)
            })
            .chain(std::iter::once(result(99, "g/empty", &[])))
            .collect();

        let summary = summarize(&results);
        assert_eq!(summary.top_projects.len(), TOP_PROJECTS);
        assert_eq!(summary.top_projects[0].project_path, "g/p03");
        assert_eq!(summary.top_projects[0].commits, 4);
        assert_eq!(summary.top_projects[1].project_path, "g/p07");
        assert!(summary
            .top_projects
            .windows(2)
            .all(|w| w[0].commits >= w[1].commits));
        let ranked = &summary.top_projects;
        assert!(ranked.iter().all(|p| p.project_path != "g/empty"));
    }

    #[test]
    fn recomputing_is_stable() {
        let results = vec![result(1, "g/a", &["alice"]), result(2, "g/b", &[])];
        assert_eq!(summarize(&results), summarize(&results));
    }
}
