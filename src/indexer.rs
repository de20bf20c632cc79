//! Drop-and-recreate indexing of the chunk list.
//!
//! Each call replaces the whole index: delete if present, create with the
//! explicit mapping, bulk insert with ids `1..=n`. Nothing is raised to the
//! caller; the scheduler runs unattended and the next cycle rebuilds from
//! scratch, so a partial failure heals itself.

use tracing::{error, info, warn};

use crate::models::Chunk;
use crate::store::{index_mapping, SearchBackend};

/// What a single [`reindex`] call achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum ReindexOutcome {
    /// Index recreated; `failed` lists ids the engine rejected.
    Indexed {
        indexed: usize,
        failed: Vec<(String, String)>,
    },
    /// Index creation failed, nothing was inserted.
    CreateFailed(String),
    /// The bulk request as a whole failed after the index was created.
    BulkFailed(String),
}

impl ReindexOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, ReindexOutcome::Indexed { failed, .. } if failed.is_empty())
    }
}

/// Replace `index` with exactly `chunks`.
pub async fn reindex(backend: &dyn SearchBackend, index: &str, chunks: &[Chunk]) -> ReindexOutcome {
    info!(index, chunks = chunks.len(), "indexing chunks");

    match backend.index_exists(index).await {
        Ok(true) => match backend.delete_index(index).await {
            Ok(()) => info!(index, "deleted old index"),
            Err(e) => warn!(index, error = %e, "failed to delete old index"),
        },
        Ok(false) => {}
        Err(e) => warn!(index, error = %e, "failed to check index existence"),
    }

    if let Err(e) = backend.create_index(index, &index_mapping()).await {
        error!(index, error = %e, "failed to create index; skipping bulk insert");
        return ReindexOutcome::CreateFailed(e.to_string());
    }
    info!(index, "created index");

    let docs: Vec<(String, Chunk)> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| ((i + 1).to_string(), chunk.clone()))
        .collect();

    match backend.bulk_index(index, &docs).await {
        Ok(outcome) => {
            if outcome.failed.is_empty() {
                info!(index, indexed = outcome.indexed, "indexed all chunks");
            } else {
                for (id, reason) in &outcome.failed {
                    warn!(index, id = %id, reason = %reason, "chunk failed to index");
                }
                warn!(
                    index,
                    indexed = outcome.indexed,
                    failed = outcome.failed.len(),
                    "bulk insert partially failed"
                );
            }
            ReindexOutcome::Indexed {
                indexed: outcome.indexed,
                failed: outcome.failed,
            }
        }
        Err(e) => {
            error!(index, error = %e, "bulk insert failed");
            ReindexOutcome::BulkFailed(e.to_string())
        }
    }
}
