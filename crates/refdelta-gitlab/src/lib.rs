//! GitLab v4 access for refdelta.
//!
//! [`GitLabClient`] implements the engine's `Transport` seam (tag, branch
//! and commit lookups plus paginated commit listing) and the project
//! endpoints [`ProjectResolver`] uses to decide which projects a run covers.

pub mod client;
pub mod resolver;

pub use client::{GitLabClient, GroupRef};
pub use resolver::{ProjectResolver, ProjectSource};
