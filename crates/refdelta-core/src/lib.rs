//! Core types, configuration, and error handling for refdelta.
//!
//! This crate provides the shared foundation used by all other refdelta crates:
//! - [`DeltaError`]: unified error type using `thiserror`
//! - [`DeltaConfig`]: configuration loaded from `.refdelta.toml`
//! - [`Transport`]: the seam to the remote host, with its tagged [`TransportError`]
//! - Shared types: [`ProjectHandle`], [`CommitRecord`], [`DeltaResult`],
//!   [`DeltaSummary`], [`CommitMatch`], [`CommitSearchReport`], [`OutputFormat`]

mod config;
mod error;
mod transport;
mod types;

pub use config::{
    DeltaConfig, DeltaRunConfig, FiltersConfig, GitLabConfig, GroupsConfig, ProjectsConfig,
    ScanConfig, ScanMode, TOKEN_ENV, URL_ENV,
};
pub use error::DeltaError;
pub use transport::{
    CommitPage, CommitRef, CommitRefKind, CommitWindow, Transport, TransportError,
    TransportErrorKind,
};
pub use types::{
    CommitMatch, CommitRecord, CommitSearchReport, DeltaOutcome, DeltaResult, DeltaSummary,
    OutputFormat, ProjectCommitCount, ProjectHandle, TOP_PROJECTS,
};

/// A convenience `Result` type for refdelta operations.
pub type Result<T> = std::result::Result<T, DeltaError>;
