//! Integration test: resolve → collect → diff → orchestrate → summarize
//! over an in-memory remote with several projects.

use std::collections::HashSet;

use refdelta_core::{DeltaOutcome, ProjectHandle, TransportError, TransportErrorKind};
use refdelta_engine::memory::{commit, MemoryTransport};
use refdelta_engine::{find_deltas, summarize, DateFilter, DeltaFinder, RunOptions};

fn project(id: u64) -> ProjectHandle {
    ProjectHandle::new(
        id,
        format!("svc-{id}"),
        format!("platform/svc-{id}"),
        format!("https://gitlab.example.com/platform/svc-{id}"),
    )
}

fn released_remote(ids: &[u64]) -> MemoryTransport {
    let c1 = commit("C1", "alice", "2025-07-01T00:00:00Z");
    let c2 = commit("C2", "bob", "2025-08-01T00:00:00Z");
    let c3 = commit("C3", "carol", "2025-09-15T00:00:00Z");
    ids.iter().fold(MemoryTransport::new(), |t, &id| {
        t.with_tag(id, "v1.0.0", vec![c1.clone()])
            .with_tag(id, "v2.0.0", vec![c3.clone(), c2.clone(), c1.clone()])
    })
}

#[tokio::test]
async fn release_delta_across_projects() {
    let transport = released_remote(&[1, 2, 3]);
    let projects: Vec<ProjectHandle> = (1..=3).map(project).collect();

    let results = find_deltas(
        &transport,
        &projects,
        "v1.0.0",
        "v2.0.0",
        &DateFilter::default(),
        RunOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 3);
    for result in &results {
        let ids: HashSet<&str> = result.commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["C2", "C3"]));
        assert_eq!(result.raw_delta_count, 2);
        assert_eq!(result.commits[0].id, "C3");
    }

    let summary = summarize(&results);
    assert_eq!(summary.projects_with_changes, 3);
    assert_eq!(summary.total_commits, 6);
    assert_eq!(summary.unique_authors, vec!["bob", "carol"]);
    assert_eq!(summary.top_projects.len(), 3);
    assert_eq!(summary.top_projects[0].project_path, "platform/svc-1");
}

#[tokio::test]
async fn one_failing_project_does_not_disturb_the_others() {
    let transport = released_remote(&[1, 2, 3]).fail_listing(
        2,
        "v2.0.0",
        TransportError::new(TransportErrorKind::Http(503), "service unavailable"),
    );
    let projects: Vec<ProjectHandle> = (1..=3).map(project).collect();

    let results = find_deltas(
        &transport,
        &projects,
        "v1.0.0",
        "v2.0.0",
        &DateFilter::default(),
        RunOptions {
            concurrency: 3,
            ..RunOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_successful());
    assert!(results[2].is_successful());
    assert_eq!(results[0].commits.len(), 2);
    assert_eq!(results[2].commits.len(), 2);

    assert_eq!(results[1].project_id, 2);
    assert_eq!(results[1].outcome(), DeltaOutcome::Failed);
    assert!(results[1].commits.is_empty());
    let error = results[1].error.as_deref().unwrap();
    assert!(error.contains("service unavailable"));

    let summary = summarize(&results);
    assert_eq!(summary.projects_with_changes, 2);
    assert_eq!(summary.projects_with_errors, 1);
    assert_eq!(summary.projects_without_changes, 0);
}

#[tokio::test]
async fn missing_reference_is_a_skip() {
    let transport = released_remote(&[1]).with_tag(2, "v1.0.0", Vec::new());
    let projects = vec![project(1), project(2)];

    let results = find_deltas(
        &transport,
        &projects,
        "v1.0.0",
        "v2.0.0",
        &DateFilter::default(),
        RunOptions::default(),
    )
    .await
    .unwrap();

    let missing = &results[1];
    assert!(missing.base_exists);
    assert!(!missing.target_exists);
    assert!(missing.commits.is_empty());
    assert!(missing.error.is_some());
    assert_eq!(missing.outcome(), DeltaOutcome::Skipped);
    assert_eq!(summarize(&results).projects_skipped, 1);
}

#[tokio::test]
async fn identical_references_are_flagged() {
    let history = vec![
        commit("C2", "bob", "2025-08-01T00:00:00Z"),
        commit("C1", "alice", "2025-07-01T00:00:00Z"),
    ];
    let transport = MemoryTransport::new()
        .with_tag(1, "v1.0.0", history.clone())
        .with_branch(1, "main", history);

    let result = DeltaFinder::new(&transport)
        .compute_delta(&project(1), "v1.0.0", "main", &DateFilter::default())
        .await;
    assert!(result.compare_same_ref);
    assert!(result.commits.is_empty());
    assert_eq!(result.outcome(), DeltaOutcome::Unchanged);
}

#[tokio::test]
async fn cherry_picked_history_is_still_a_set_difference() {
    // The target branch carries a rebased copy of P (new hash P') plus F.
    // Only hashes matter: P' and F are new, P is not in the target at all.
    let root = commit("R", "alice", "2025-01-01T00:00:00Z");
    let picked = commit("P", "bob", "2025-02-01T00:00:00Z");
    let mut rebased = commit("P-prime", "bob", "2025-03-01T00:00:00Z");
    rebased.parent_ids = vec!["R".into()];
    let mut feature = commit("F", "carol", "2025-03-02T00:00:00Z");
    feature.parent_ids = vec!["P-prime".into(), "R".into()];

    let transport = MemoryTransport::new()
        .with_branch(1, "stable", vec![picked, root.clone()])
        .with_branch(1, "next", vec![feature, rebased, root]);

    let result = DeltaFinder::new(&transport)
        .compute_delta(&project(1), "stable", "next", &DateFilter::default())
        .await;
    let ids: Vec<&str> = result.commits.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["F", "P-prime"]);
    assert!(result.commits[0].is_merge());
}

#[tokio::test]
async fn date_window_applies_after_the_difference() {
    let transport = released_remote(&[1]);
    let filter =
        DateFilter::parse(Some("2025-09-01T00:00:00Z"), Some("2025-12-31T23:59:59Z")).unwrap();

    let result = DeltaFinder::new(&transport)
        .compute_delta(&project(1), "v1.0.0", "v2.0.0", &filter)
        .await;
    assert_eq!(result.raw_delta_count, 2);
    assert_eq!(result.commits.len(), 1);
    assert_eq!(result.commits[0].id, "C3");
    assert!(result.commits.len() <= result.raw_delta_count);
}
