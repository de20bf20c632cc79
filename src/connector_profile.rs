//! Portfolio profile connector.
//!
//! Reads each configured collection from the portfolio API as a JSON array
//! and assembles the db snapshot: one key per collection, in configuration
//! order, each holding the cleaned records.
//!
//! Cleaning drops soft-deleted records (`"deleted": true`), removes
//! bookkeeping and media fields, then prunes empty values so the chunker
//! only sees text worth indexing.
//!
//! # Configuration
//!
//! ```toml
//! [sources.profile]
//! base_url = "https://portfolio.example.com/api"
//! exclude_fields = ["_id", "likesCount", "deleted"]
//! exclude_suffixes = ["Link", "URLs", "Images"]
//!
//! [[sources.profile.collections]]
//! name = "projectTable"
//! path = "/getprojects"
//! ```
//!
//! When `collections` is omitted, the seven portfolio collections
//! (experiences, honors, involvements, projects, skills, skill components,
//! year-in-review) are read.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::ProfileSourceConfig;
use crate::error::SourceUnavailable;
use crate::models::Source;
use crate::snapshot::prune_empty;
use crate::sources::SourceReader;

pub struct ProfileReader {
    config: ProfileSourceConfig,
    client: reqwest::Client,
}

impl ProfileReader {
    pub fn new(config: ProfileSourceConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::Client::builder().build()?,
        })
    }

    async fn fetch_collection(&self, path: &str) -> Result<Vec<Value>, String> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("GET {}: {}", url, e))?;
        if !response.status().is_success() {
            return Err(format!("GET {} returned {}", url, response.status()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("GET {}: invalid JSON: {}", url, e))?;
        match body {
            Value::Array(records) => Ok(records),
            _ => Err(format!("GET {}: expected a JSON array", url)),
        }
    }
}

#[async_trait]
impl SourceReader for ProfileReader {
    fn source(&self) -> Source {
        Source::Db
    }

    async fn read(&self) -> Result<Value, SourceUnavailable> {
        let mut snapshot = Map::new();
        for collection in &self.config.collections {
            let records = self
                .fetch_collection(&collection.path)
                .await
                .map_err(|reason| SourceUnavailable {
                    origin: Source::Db,
                    reason,
                })?;
            let cleaned = clean_records(records, &self.config);
            debug!(collection = %collection.name, records = cleaned.len(), "profile collection fetched");
            snapshot.insert(collection.name.clone(), Value::Array(cleaned));
        }
        Ok(Value::Object(snapshot))
    }
}

/// Drop soft-deleted records and excluded fields, then prune empties.
pub fn clean_records(records: Vec<Value>, config: &ProfileSourceConfig) -> Vec<Value> {
    records
        .into_iter()
        .filter(|record| record.get("deleted").and_then(Value::as_bool) != Some(true))
        .filter_map(|record| match record {
            Value::Object(map) => Some(Value::Object(strip_fields(map, config))),
            _ => None,
        })
        .map(prune_empty)
        .filter(|record| record.as_object().is_some_and(|m| !m.is_empty()))
        .collect()
}

fn strip_fields(map: Map<String, Value>, config: &ProfileSourceConfig) -> Map<String, Value> {
    map.into_iter()
        .filter(|(key, _)| !is_excluded(key, config))
        .collect()
}

fn is_excluded(key: &str, config: &ProfileSourceConfig) -> bool {
    config.exclude_fields.iter().any(|f| f == key)
        || config
            .exclude_suffixes
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ProfileSourceConfig {
        toml::from_str(r#"base_url = "http://localhost:5000/api""#).unwrap()
    }

    #[test]
    fn test_defaults_cover_seven_collections() {
        let c = config();
        assert_eq!(c.collections.len(), 7);
        assert_eq!(c.collections[3].name, "projectTable");
        assert_eq!(c.collections[3].path, "/getprojects");
    }

    #[test]
    fn test_clean_records() {
        let records = vec![
            json!({
                "_id": "abc",
                "projectTitle": "Chatbot",
                "projectTagline": "AI",
                "projectLink": "https://x",
                "projectURLs": ["https://y"],
                "projectImages": ["a.png"],
                "likesCount": 4,
                "projectParagraphs": ["Built.", ""],
                "notes": ""
            }),
            json!({"projectTitle": "Gone", "deleted": true}),
            json!({"_id": "only-bookkeeping"}),
            json!("not a record"),
        ];
        let cleaned = clean_records(records, &config());
        assert_eq!(
            cleaned,
            vec![json!({
                "projectTitle": "Chatbot",
                "projectTagline": "AI",
                "projectParagraphs": ["Built."]
            })]
        );
    }

    #[test]
    fn test_deleted_false_is_kept() {
        let cleaned = clean_records(vec![json!({"title": "x", "deleted": false})], &config());
        assert_eq!(cleaned, vec![json!({"title": "x"})]);
    }
}
