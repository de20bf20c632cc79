//! Typed failures surfaced by the pipeline.
//!
//! Most internal plumbing returns `anyhow::Result`; these enums exist where a
//! caller needs to branch on the kind of failure (the chat endpoint maps them
//! to status codes, the scheduler aborts only the current cycle).

use std::time::Duration;

use thiserror::Error;

use crate::models::Source;

/// A source reader could not reach its backing API or file.
///
/// Always recovered locally by falling back to the last persisted snapshot.
#[derive(Debug, Error)]
#[error("source {origin} unavailable: {reason}")]
pub struct SourceUnavailable {
    pub origin: Source,
    pub reason: String,
}

/// The search engine (or the index) did not report yellow/green in time.
#[derive(Debug, Error)]
#[error("{target} not healthy after {}s", waited.as_secs())]
pub struct IndexUnhealthy {
    /// `"cluster"` or the index name.
    pub target: String,
    pub waited: Duration,
}

/// The completion service failed to produce an answer.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion payload: {0}")]
    Malformed(String),
}

/// Failure of the full question → answer read path.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error(transparent)]
    Completion(#[from] CompletionError),
}
