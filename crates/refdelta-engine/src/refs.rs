//! Reference resolution: is this name a tag, a branch, or a commit?
//!
//! Lookups run in a fixed order (tag, branch, commit) and stop at the first
//! match. A 404 from one lookup is an ordinary "no"; any other failure is
//! remembered and the next kind is still tried. Only an explicit match
//! counts as existing.

use std::fmt;

use refdelta_core::{Transport, TransportError};
use serde::Serialize;

/// What kind of reference a name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    /// A tag.
    Tag,
    /// A branch.
    Branch,
    /// A raw commit id.
    Commit,
}

impl RefKind {
    /// Lookup order.
    pub const ORDER: [RefKind; 3] = [RefKind::Tag, RefKind::Branch, RefKind::Commit];
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::Tag => write!(f, "tag"),
            RefKind::Branch => write!(f, "branch"),
            RefKind::Commit => write!(f, "commit"),
        }
    }
}

/// Outcome of resolving one reference name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefLookup {
    /// The first lookup that answered yes.
    Found(RefKind),
    /// Every lookup answered a clean 404.
    Missing,
    /// Nothing matched and at least one lookup failed for another reason;
    /// carries the last such failure.
    Inconclusive(TransportError),
}

impl RefLookup {
    /// Only an explicit match counts.
    pub fn exists(&self) -> bool {
        matches!(self, RefLookup::Found(_))
    }
}

/// Resolve `name` in one project.
///
/// # Examples
///
/// ```
/// use refdelta_engine::memory::{commit, MemoryTransport};
/// use refdelta_engine::refs::{resolve_ref, RefKind, RefLookup};
///
/// let transport = MemoryTransport::new()
///     .with_branch(1, "main", vec![commit("c1", "alice", "2025-01-01T00:00:00Z")]);
///
/// futures::executor::block_on(async {
///     assert_eq!(resolve_ref(&transport, 1, "main").await, RefLookup::Found(RefKind::Branch));
///     assert_eq!(resolve_ref(&transport, 1, "c1").await, RefLookup::Found(RefKind::Commit));
///     assert_eq!(resolve_ref(&transport, 1, "v9").await, RefLookup::Missing);
/// });
/// ```
pub async fn resolve_ref<T: Transport + ?Sized>(
    transport: &T,
    project_id: u64,
    name: &str,
) -> RefLookup {
    let mut last_error = None;

    for kind in RefKind::ORDER {
        let answer = match kind {
            RefKind::Tag => transport.get_tag(project_id, name).await,
            RefKind::Branch => transport.get_branch(project_id, name).await,
            RefKind::Commit => transport.get_commit(project_id, name).await.map(|_| ()),
        };
        match answer {
            Ok(()) => {
                tracing::debug!(project_id, reference = name, %kind, "reference resolved");
                return RefLookup::Found(kind);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(project_id, reference = name, %kind, "error checking {kind}: {e}");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => RefLookup::Inconclusive(e),
        None => {
            tracing::debug!(project_id, reference = name, "reference not found");
            RefLookup::Missing
        }
    }
}

/// Boolean form of [`resolve_ref`].
pub async fn ref_exists<T: Transport + ?Sized>(transport: &T, project_id: u64, name: &str) -> bool {
    resolve_ref(transport, project_id, name).await.exists()
}
