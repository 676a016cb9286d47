//! Error taxonomy surfaced by the analysis pipeline.
//!
//! Plumbing code (config loading, CLI, server bootstrap) uses `anyhow`;
//! everything a caller of [`crate::analyze::Analyzer::analyze`] can observe
//! is one of these variants.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input could not be reduced to an `(owner, name)` pair.
    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Private or forbidden repository.
    #[error("repository inaccessible: {0}")]
    RepositoryInaccessible(String),

    /// Network, rate-limit, or upstream failure with no remaining fallback.
    #[error("metadata source unavailable: {0}")]
    SourceUnavailable(String),

    /// An entry already exists for this identifier.
    #[error("cache entry already exists for {0}")]
    DuplicateEntry(String),

    #[error("analysis failed: {0}")]
    AnalysisFailed(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::AnalysisFailed(format!("storage: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::AnalysisFailed(format!("serialization: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
