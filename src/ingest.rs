//! Snapshot → chunk pipeline and its CLI reports.
//!
//! Coordinates the write-side flow up to the index: optional snapshot
//! refresh → load all three snapshots → chunk. The reindex scheduler and the
//! `snapshot` / `chunk` commands share this path.

use std::sync::Arc;

use anyhow::Result;

use crate::chunk::{chunk_snapshots, fingerprint};
use crate::config::{Config, SnapshotConfig};
use crate::models::{Chunk, Source};
use crate::snapshot::SnapshotSet;
use crate::sources::{readers_from_config, refresh_snapshots, RefreshStatus, SourceReader};

/// Which snapshots to regenerate before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRefresh {
    /// Chunk what is on disk.
    Skip,
    /// Regenerate missing or expired snapshots.
    Stale,
    /// Regenerate every snapshot regardless of age.
    All,
}

/// Apply `refresh` then chunk everything on disk.
pub async fn prepare_chunks(
    readers: &[Arc<dyn SourceReader>],
    snapshots: &SnapshotConfig,
    refresh: SnapshotRefresh,
) -> Vec<Chunk> {
    match refresh {
        SnapshotRefresh::Skip => {}
        SnapshotRefresh::Stale => {
            refresh_snapshots(readers, snapshots, false).await;
        }
        SnapshotRefresh::All => {
            refresh_snapshots(readers, snapshots, true).await;
        }
    }
    let set = SnapshotSet::load(snapshots);
    chunk_snapshots(&set.db, &set.github, &set.resume)
}

/// `companion snapshot`: refresh one or all sources and report.
pub async fn run_snapshot(config: &Config, only: Option<Source>, force: bool) -> Result<()> {
    let readers: Vec<Arc<dyn SourceReader>> = readers_from_config(config)?
        .into_iter()
        .filter(|r| only.map_or(true, |s| r.source() == s))
        .collect();

    if readers.is_empty() {
        println!("snapshot: no configured reader for {}", scope_label(only));
        return Ok(());
    }

    let results = refresh_snapshots(&readers, &config.snapshots, force).await;
    println!("snapshot {}", scope_label(only));
    for (source, status) in results {
        match status {
            RefreshStatus::Updated { records } => {
                println!("  {}: updated ({} records)", source, records)
            }
            RefreshStatus::Fresh => println!("  {}: fresh, skipped", source),
            RefreshStatus::KeptPrevious { reason } => {
                println!("  {}: kept previous snapshot ({})", source, reason)
            }
        }
    }
    println!("ok");
    Ok(())
}

/// `companion chunk`: chunk the current snapshots without indexing.
pub async fn run_chunk(config: &Config, refresh: bool) -> Result<()> {
    let readers = if refresh {
        readers_from_config(config)?
    } else {
        Vec::new()
    };
    let policy = if refresh {
        SnapshotRefresh::Stale
    } else {
        SnapshotRefresh::Skip
    };
    let chunks = prepare_chunks(&readers, &config.snapshots, policy).await;

    println!("chunk");
    for source in Source::ALL {
        let count = chunks.iter().filter(|c| c.source == source).count();
        println!("  {}: {}", source, count);
    }
    println!("  total: {}", chunks.len());
    println!("  fingerprint: {}", fingerprint(&chunks));
    Ok(())
}

fn scope_label(only: Option<Source>) -> String {
    only.map_or_else(|| "all".to_string(), |s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::write_snapshot;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_chunks_from_disk() {
        let tmp = TempDir::new().unwrap();
        let snapshots = SnapshotConfig {
            dir: tmp.path().to_path_buf(),
            max_age_hours: 24,
        };
        write_snapshot(
            &snapshots.snapshot_path(Source::Github),
            &json!([{"name": "repo1", "description": "demo", "language": "Go"}]),
        )
        .unwrap();
        write_snapshot(
            &snapshots.snapshot_path(Source::Resume),
            &json!({"resume_text": "SKILLS\nRust"}),
        )
        .unwrap();

        let chunks = prepare_chunks(&[], &snapshots, SnapshotRefresh::Skip).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source, Source::Github);
        assert_eq!(chunks[1].title, "SKILLS");
    }

    #[tokio::test]
    async fn test_prepare_chunks_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let snapshots = SnapshotConfig {
            dir: tmp.path().join("none"),
            max_age_hours: 24,
        };
        assert!(prepare_chunks(&[], &snapshots, SnapshotRefresh::All).await.is_empty());
    }
}
