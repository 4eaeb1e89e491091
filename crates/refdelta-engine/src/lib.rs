//! Delta discovery over remote repositories.
//!
//! For each project, [`delta::DeltaFinder`] resolves the base and target
//! references ([`refs`]), collects everything reachable from each
//! ([`collector`]), and keeps the target commits the base cannot reach.
//! [`orchestrator`] fans that out over many projects and [`summary`]
//! folds the results into run-level statistics. [`search`] answers the
//! reverse question: which projects, branches and tags contain a commit.
//!
//! All remote access goes through [`refdelta_core::Transport`];
//! [`memory::MemoryTransport`] is an in-process implementation for tests.

pub mod collector;
pub mod delta;
pub mod memory;
pub mod orchestrator;
pub mod refs;
pub mod search;
pub mod summary;

pub use collector::{collect, ReachableSet};
pub use delta::{DateFilter, DeltaFinder};
pub use orchestrator::{find_deltas, stream_deltas, RunOptions};
pub use refs::{ref_exists, resolve_ref, RefKind, RefLookup};
pub use search::{find_commit, parse_commit_list, search_commits};
pub use summary::summarize;
