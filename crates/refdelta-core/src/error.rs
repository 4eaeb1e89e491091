use std::path::PathBuf;

use crate::transport::TransportError;

/// Errors that can occur across refdelta.
///
/// Per-project failures never surface as a `DeltaError`; the delta engine
/// records them on the project's `DeltaResult` instead. What remains here is
/// fatal: bad configuration, bad input, or a failure outside any single
/// project (e.g. project discovery).
///
/// # Examples
///
/// ```
/// use refdelta_core::DeltaError;
///
/// let err = DeltaError::Config("missing private token".into());
/// assert!(err.to_string().contains("missing private token"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DeltaError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("run `refdelta init` for a commented template"))]
    Config(String),

    /// The caller asked for something that has no meaningful result.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Remote API failure outside a per-project computation.
    #[error("GitLab API error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
