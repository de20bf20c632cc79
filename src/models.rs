//! Core data models used throughout the companion pipeline.
//!
//! These types represent the chunks that flow from the snapshot files into
//! the search index, and the hits that flow back out of it at query time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Origin category of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Db,
    Github,
    Resume,
}

impl Source {
    /// All sources in indexing order.
    pub const ALL: [Source; 3] = [Source::Db, Source::Github, Source::Resume];

    /// Keyword stored in the index `source` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Db => "db",
            Source::Github => "github",
            Source::Resume => "resume",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "db" => Ok(Source::Db),
            "github" => Ok(Source::Github),
            "resume" => Ok(Source::Resume),
            other => anyhow::bail!("Unknown source: '{}'. Must be db, github, or resume.", other),
        }
    }
}

/// The atomic retrievable unit.
///
/// Chunks carry no identity of their own; the indexer assigns a 1-based
/// sequential id when the chunk list is pushed into the search engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub title: String,
    pub content: String,
}

/// A chunk returned from the search engine with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Document id assigned at indexing time.
    pub id: String,
    /// Raw relevance score from the engine.
    pub score: f64,
    pub chunk: Chunk,
}
