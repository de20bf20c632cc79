//! In-memory [`SearchBackend`] for tests and offline runs.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. Scoring is a
//! crude stand-in for BM25 `best_fields`: per field, count query-token
//! occurrences, double the title count, and take the better of the two.
//! Hits with a zero score are not returned.
//!
//! Health and index-creation failures can be injected to drive the
//! scheduler and indexer through their failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{BulkOutcome, HealthStatus, SearchBackend, SearchQuery};
use crate::models::{Chunk, SearchHit};

#[derive(Default)]
struct Faults {
    health: Option<HealthStatus>,
    unreachable: bool,
    fail_create: bool,
    /// Document ids rejected by `bulk_index`.
    reject_ids: Vec<String>,
}

/// In-memory chunk index.
pub struct MemoryIndex {
    indices: RwLock<HashMap<String, Vec<(String, Chunk)>>>,
    faults: RwLock<Faults>,
    searches: AtomicUsize,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            faults: RwLock::new(Faults::default()),
            searches: AtomicUsize::new(0),
        }
    }

    /// Override the reported health (default green).
    pub fn set_health(&self, status: HealthStatus) {
        self.write_faults().health = Some(status);
    }

    /// Make every health check fail as if the engine were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.write_faults().unreachable = unreachable;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.write_faults().fail_create = fail;
    }

    pub fn reject_ids(&self, ids: &[&str]) {
        self.write_faults().reject_ids = ids.iter().map(|s| s.to_string()).collect();
    }

    /// Documents currently stored under `index`, in insertion order.
    pub fn documents(&self, index: &str) -> Option<Vec<(String, Chunk)>> {
        self.read_indices().get(index).cloned()
    }

    /// Number of `search` calls served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    fn read_indices(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<(String, Chunk)>>> {
        self.indices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_indices(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<(String, Chunk)>>> {
        self.indices.write().unwrap_or_else(|e| e.into_inner())
    }

    fn write_faults(&self) -> std::sync::RwLockWriteGuard<'_, Faults> {
        self.faults.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_faults(&self) -> std::sync::RwLockReadGuard<'_, Faults> {
        self.faults.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn score(query_tokens: &[String], chunk: &Chunk) -> f64 {
    let count = |text: &str| {
        let tokens = tokenize(text);
        query_tokens
            .iter()
            .map(|q| tokens.iter().filter(|t| *t == q).count())
            .sum::<usize>() as f64
    };
    (2.0 * count(&chunk.title)).max(count(&chunk.content))
}

#[async_trait]
impl SearchBackend for MemoryIndex {
    async fn health(&self, index: Option<&str>) -> Result<HealthStatus> {
        let faults = self.read_faults();
        if faults.unreachable {
            bail!("connection refused");
        }
        if let Some(index) = index {
            if !self.read_indices().contains_key(index) {
                bail!("no such index [{}]", index);
            }
        }
        Ok(faults.health.unwrap_or(HealthStatus::Green))
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.read_indices().contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        self.write_indices().remove(index);
        Ok(())
    }

    async fn create_index(&self, index: &str, _mapping: &Value) -> Result<()> {
        if self.read_faults().fail_create {
            bail!("create index '{}' rejected", index);
        }
        let mut indices = self.write_indices();
        if indices.contains_key(index) {
            bail!("index '{}' already exists", index);
        }
        indices.insert(index.to_string(), Vec::new());
        Ok(())
    }

    async fn bulk_index(&self, index: &str, docs: &[(String, Chunk)]) -> Result<BulkOutcome> {
        let rejected = self.read_faults().reject_ids.clone();
        let mut indices = self.write_indices();
        let Some(stored) = indices.get_mut(index) else {
            bail!("no such index [{}]", index);
        };

        let mut outcome = BulkOutcome::default();
        for (id, chunk) in docs {
            if rejected.contains(id) {
                outcome.failed.push((id.clone(), "rejected".to_string()));
                continue;
            }
            stored.retain(|(existing, _)| existing != id);
            stored.push((id.clone(), chunk.clone()));
            outcome.indexed += 1;
        }
        Ok(outcome)
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);

        let indices = self.read_indices();
        // A missing index mirrors the reindex window: no results, not an error.
        let Some(stored) = indices.get(index) else {
            return Ok(Vec::new());
        };

        let query_tokens = tokenize(&query.text);
        let mut hits: Vec<SearchHit> = stored
            .iter()
            .filter(|(_, chunk)| query.source.map_or(true, |s| chunk.source == s))
            .filter_map(|(id, chunk)| {
                let s = score(&query_tokens, chunk);
                (s > 0.0).then(|| SearchHit {
                    id: id.clone(),
                    score: s,
                    chunk: chunk.clone(),
                })
            })
            .collect();

        // Ties broken by insertion id for determinism.
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| id_order(&a.id).cmp(&id_order(&b.id)))
        });
        hits.truncate(query.size);
        Ok(hits)
    }
}

fn id_order(id: &str) -> (u64, &str) {
    (id.parse().unwrap_or(u64::MAX), id)
}
