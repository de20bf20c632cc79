//! Source snapshot files.
//!
//! Each source reader materializes its data into one JSON file so the
//! expensive fetch does not repeat every reindex cycle. Files are written
//! atomically and read leniently: a missing or corrupt snapshot reads as the
//! empty snapshot for that source.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::SnapshotConfig;
use crate::models::Source;

/// The three snapshots a reindex cycle chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSet {
    pub db: Value,
    pub github: Value,
    pub resume: Value,
}

impl SnapshotSet {
    pub fn load(config: &SnapshotConfig) -> Self {
        Self {
            db: load_snapshot(&config.snapshot_path(Source::Db), Source::Db),
            github: load_snapshot(&config.snapshot_path(Source::Github), Source::Github),
            resume: load_snapshot(&config.snapshot_path(Source::Resume), Source::Resume),
        }
    }
}

/// Shape a source's snapshot takes when there is no data.
pub fn empty_snapshot(source: Source) -> Value {
    match source {
        Source::Db => json!({}),
        Source::Github => json!([]),
        Source::Resume => json!({ "resume_text": "" }),
    }
}

/// Read a snapshot, falling back to [`empty_snapshot`].
pub fn load_snapshot(path: &Path, source: Source) -> Value {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to read snapshot");
            }
            return empty_snapshot(source);
        }
    };
    serde_json::from_str(&data).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "snapshot is not valid JSON; using empty");
        empty_snapshot(source)
    })
}

/// Write a snapshot via temp file + rename.
pub fn write_snapshot(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_string_pretty(value)?;
    std::fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
    Ok(())
}

/// Last modification time of a snapshot file.
pub fn snapshot_updated_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified: SystemTime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// True when the snapshot is missing or older than `max_age_hours`.
pub fn is_stale(path: &Path, max_age_hours: u64, now: DateTime<Utc>) -> bool {
    match snapshot_updated_at(path) {
        Some(updated) => now - updated >= chrono::Duration::hours(max_age_hours as i64),
        None => true,
    }
}

/// Number of records a snapshot will chunk into at most: list elements
/// across collections for db, array length for github, 1 if resume text
/// is present.
pub fn record_count(source: Source, value: &Value) -> usize {
    match source {
        Source::Db => value
            .as_object()
            .map(|m| m.values().filter_map(Value::as_array).map(Vec::len).sum())
            .unwrap_or(0),
        Source::Github => value.as_array().map(Vec::len).unwrap_or(0),
        Source::Resume => value
            .get("resume_text")
            .and_then(Value::as_str)
            .map_or(0, |t| usize::from(!t.trim().is_empty())),
    }
}

/// Recursively drop nulls, blank strings, empty arrays and empty objects
/// from arrays and objects. The top-level value itself is always returned.
pub fn prune_empty(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(prune_empty)
                .filter(|v| !is_empty_value(v))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, prune_empty(v)))
                .filter(|(_, v)| !is_empty_value(v))
                .collect(),
        ),
        other => other,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
