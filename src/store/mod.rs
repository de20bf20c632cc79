//! Search engine abstraction.
//!
//! The [`SearchBackend`] trait covers the handful of engine operations the
//! pipeline needs: health checks, index lifecycle, bulk insert, and a
//! `multi_match` query with an optional source filter. Two implementations:
//!
//! - [`opensearch::OpenSearchClient`] talks to an OpenSearch/Elasticsearch
//!   cluster over its REST API.
//! - [`memory::MemoryIndex`] keeps documents in-process with a simple
//!   token-overlap scorer, for tests and offline runs.
//!
//! Implementations must be `Send + Sync`; the backend is shared between the
//! reindex scheduler and query-time retrieval.

pub mod memory;
pub mod opensearch;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{Chunk, SearchHit, Source};

/// Fields searched by every query; title matches count double.
pub const SEARCH_FIELDS: [&str; 2] = ["title^2", "content"];

/// Cluster or index health as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Red,
    Yellow,
    Green,
}

impl HealthStatus {
    /// Yellow or green: primaries are allocated and queries can be served.
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthStatus::Yellow | HealthStatus::Green)
    }
}

/// A single full-text query against the chunk index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    /// Restrict hits to one source (exact match on the `source` keyword).
    pub source: Option<Source>,
    pub size: usize,
}

impl SearchQuery {
    /// Request body for the engine's `_search` endpoint.
    pub fn to_body(&self) -> Value {
        let must = json!({
            "multi_match": {
                "query": self.text,
                "fields": SEARCH_FIELDS,
                "type": "best_fields",
            }
        });
        let mut bool_query = json!({ "must": must });
        if let Some(source) = self.source {
            bool_query["filter"] = json!({ "term": { "source": source.as_str() } });
        }
        json!({
            "size": self.size,
            "query": { "bool": bool_query },
        })
    }
}

/// Result of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOutcome {
    pub indexed: usize,
    /// `(document id, reason)` for every document the engine rejected.
    pub failed: Vec<(String, String)>,
}

/// Explicit mapping for the chunk index: `source`/`section` are exact-match
/// keywords, `title`/`content` are analyzed text.
pub fn index_mapping() -> Value {
    json!({
        "properties": {
            "source": { "type": "keyword" },
            "section": { "type": "keyword" },
            "title": { "type": "text" },
            "content": { "type": "text" },
        }
    })
}

/// Abstract search engine used by the indexer and the retriever.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`health`](SearchBackend::health) | Cluster health, or a single index's when `index` is set |
/// | [`index_exists`](SearchBackend::index_exists) | Does the index exist |
/// | [`delete_index`](SearchBackend::delete_index) | Drop the index (missing is not an error) |
/// | [`create_index`](SearchBackend::create_index) | Create with an explicit mapping |
/// | [`bulk_index`](SearchBackend::bulk_index) | Insert documents under caller-supplied ids |
/// | [`search`](SearchBackend::search) | Run a [`SearchQuery`], best hits first |
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn health(&self, index: Option<&str>) -> Result<HealthStatus>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn delete_index(&self, index: &str) -> Result<()>;

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()>;

    async fn bulk_index(&self, index: &str, docs: &[(String, Chunk)]) -> Result<BulkOutcome>;

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<SearchHit>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_body_with_filter() {
        let q = SearchQuery {
            text: "rust".into(),
            source: Some(Source::Github),
            size: 5,
        };
        let body = q.to_body();
        assert_eq!(body["size"], 5);
        assert_eq!(
            body["query"]["bool"]["must"]["multi_match"]["fields"],
            json!(["title^2", "content"])
        );
        assert_eq!(body["query"]["bool"]["filter"]["term"]["source"], "github");
    }

    #[test]
    fn test_query_body_without_filter() {
        let q = SearchQuery {
            text: "rust".into(),
            source: None,
            size: 5,
        };
        assert!(q.to_body()["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_health_readiness() {
        assert!(!HealthStatus::Red.is_ready());
        assert!(HealthStatus::Yellow.is_ready());
        assert!(HealthStatus::Green.is_ready());
    }
}
