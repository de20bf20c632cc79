//! Source readers and snapshot refresh.
//!
//! A [`SourceReader`] materializes one source (profile records, GitHub
//! repositories, resume text) into its JSON snapshot shape. Refreshing a
//! snapshot never fails outward: when a reader reports
//! [`SourceUnavailable`], the previous snapshot file is kept (or an empty one
//! written) and a warning is logged.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{Config, SnapshotConfig};
use crate::connector_github::GithubReader;
use crate::connector_profile::ProfileReader;
use crate::connector_resume::ResumeReader;
use crate::error::SourceUnavailable;
use crate::models::Source;
use crate::snapshot::{
    empty_snapshot, is_stale, load_snapshot, record_count, snapshot_updated_at, write_snapshot,
};

/// Materializes one source into its snapshot.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use portfolio_companion::error::SourceUnavailable;
/// use portfolio_companion::models::Source;
/// use portfolio_companion::sources::SourceReader;
/// use serde_json::{json, Value};
///
/// struct StaticRepos;
///
/// #[async_trait]
/// impl SourceReader for StaticRepos {
///     fn source(&self) -> Source { Source::Github }
///     async fn read(&self) -> Result<Value, SourceUnavailable> {
///         Ok(json!([{ "name": "repo1", "language": "Rust" }]))
///     }
/// }
/// ```
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Which snapshot this reader produces.
    fn source(&self) -> Source;

    /// Fetch and normalize the source.
    async fn read(&self) -> Result<Value, SourceUnavailable>;
}

/// Readers for every source configured in `config`.
///
/// The GitHub reader is only built when `GITHUB_TOKEN` is set.
pub fn readers_from_config(config: &Config) -> Result<Vec<Arc<dyn SourceReader>>> {
    let mut readers: Vec<Arc<dyn SourceReader>> = Vec::new();
    if let Some(profile) = &config.sources.profile {
        readers.push(Arc::new(ProfileReader::new(profile.clone())?));
    }
    match std::env::var("GITHUB_TOKEN") {
        Ok(token) if !token.is_empty() => {
            readers.push(Arc::new(GithubReader::new(config.sources.github.clone(), token)?));
        }
        _ => info!("GITHUB_TOKEN not set; github snapshot will not be refreshed"),
    }
    if let Some(resume) = &config.sources.resume {
        readers.push(Arc::new(ResumeReader::new(resume.pdf_path.clone())));
    }
    Ok(readers)
}

/// What happened to one snapshot during a refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshStatus {
    /// Fetched and written; `records` is the snapshot's record count.
    Updated { records: usize },
    /// Still fresh, not fetched.
    Fresh,
    /// Reader failed; the previous snapshot (or an empty one) stays in place.
    KeptPrevious { reason: String },
}

/// Refresh each reader's snapshot if stale (or always, when `force`).
pub async fn refresh_snapshots(
    readers: &[Arc<dyn SourceReader>],
    snapshots: &SnapshotConfig,
    force: bool,
) -> Vec<(Source, RefreshStatus)> {
    let mut results = Vec::with_capacity(readers.len());
    for reader in readers {
        let source = reader.source();
        let path = snapshots.snapshot_path(source);

        if !force && !is_stale(&path, snapshots.max_age_hours, Utc::now()) {
            results.push((source, RefreshStatus::Fresh));
            continue;
        }

        let status = match reader.read().await {
            Ok(value) => match write_snapshot(&path, &value) {
                Ok(()) => {
                    let records = record_count(source, &value);
                    info!(%source, records, path = %path.display(), "snapshot saved");
                    RefreshStatus::Updated { records }
                }
                Err(e) => {
                    warn!(%source, error = %e, "failed to write snapshot");
                    RefreshStatus::KeptPrevious {
                        reason: e.to_string(),
                    }
                }
            },
            Err(e) => {
                warn!(%source, error = %e, "source unavailable; keeping previous snapshot");
                if !path.exists() {
                    if let Err(write_err) = write_snapshot(&path, &empty_snapshot(source)) {
                        warn!(%source, error = %write_err, "failed to write empty snapshot");
                    }
                }
                RefreshStatus::KeptPrevious {
                    reason: e.reason.clone(),
                }
            }
        };
        results.push((source, status));
    }
    results
}

/// Print snapshot status for every source.
pub fn list_sources(config: &Config) -> Result<()> {
    println!(
        "{:<8} {:<8} {:<8} {:<22} PATH",
        "SOURCE", "PRESENT", "RECORDS", "UPDATED"
    );
    for source in Source::ALL {
        let path = config.snapshots.snapshot_path(source);
        let present = path.exists();
        let records = if present {
            record_count(source, &load_snapshot(&path, source))
        } else {
            0
        };
        let updated = snapshot_updated_at(&path)
            .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<8} {:<8} {:<22} {}",
            source,
            present,
            records,
            updated,
            path.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct FixedReader {
        source: Source,
        result: Option<Value>,
    }

    #[async_trait]
    impl SourceReader for FixedReader {
        fn source(&self) -> Source {
            self.source
        }

        async fn read(&self) -> Result<Value, SourceUnavailable> {
            self.result.clone().ok_or_else(|| SourceUnavailable {
                origin: self.source,
                reason: "offline".to_string(),
            })
        }
    }

    fn snapshot_config(tmp: &TempDir) -> SnapshotConfig {
        SnapshotConfig {
            dir: tmp.path().to_path_buf(),
            max_age_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_unavailable_source_writes_empty_when_missing() {
        let tmp = TempDir::new().unwrap();
        let config = snapshot_config(&tmp);
        let readers: Vec<Arc<dyn SourceReader>> = vec![Arc::new(FixedReader {
            source: Source::Github,
            result: None,
        })];

        let results = refresh_snapshots(&readers, &config, true).await;
        assert!(matches!(results[0].1, RefreshStatus::KeptPrevious { .. }));
        assert_eq!(
            load_snapshot(&config.snapshot_path(Source::Github), Source::Github),
            json!([])
        );
    }

    #[tokio::test]
    async fn test_unavailable_source_keeps_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let config = snapshot_config(&tmp);
        let path = config.snapshot_path(Source::Db);
        write_snapshot(&path, &json!({"projectTable": [{"projectTitle": "Old"}]})).unwrap();

        let readers: Vec<Arc<dyn SourceReader>> = vec![Arc::new(FixedReader {
            source: Source::Db,
            result: None,
        })];
        refresh_snapshots(&readers, &config, true).await;
        assert_eq!(record_count(Source::Db, &load_snapshot(&path, Source::Db)), 1);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_not_refetched() {
        let tmp = TempDir::new().unwrap();
        let config = snapshot_config(&tmp);
        write_snapshot(&config.snapshot_path(Source::Resume), &json!({"resume_text": "old"}))
            .unwrap();

        let readers: Vec<Arc<dyn SourceReader>> = vec![Arc::new(FixedReader {
            source: Source::Resume,
            result: Some(json!({"resume_text": "new"})),
        })];
        let results = refresh_snapshots(&readers, &config, false).await;
        assert_eq!(results[0].1, RefreshStatus::Fresh);

        let results = refresh_snapshots(&readers, &config, true).await;
        assert_eq!(results[0].1, RefreshStatus::Updated { records: 1 });
        assert_eq!(
            load_snapshot(&config.snapshot_path(Source::Resume), Source::Resume),
            json!({"resume_text": "new"})
        );
    }
}
