//! Persistent prompt → answer cache.
//!
//! A single JSON object on disk keyed by the exact composed prompt. There is
//! no eviction; every miss rewrites the whole file. Writes go through a temp
//! file and rename, and an in-process mutex serializes read-modify-write.
//! Separate processes sharing the file are not coordinated.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::completion::CompletionClient;
use crate::error::CompletionError;

pub struct AnswerCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AnswerCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Answer for `prompt`, from cache when present, otherwise from `client`.
    ///
    /// On a miss the trimmed answer is stored before returning. Failures
    /// from the completion service are returned as-is and never stored.
    pub async fn get_answer(
        &self,
        client: &dyn CompletionClient,
        prompt: &str,
    ) -> Result<String, CompletionError> {
        if let Some(answer) = self.lookup(prompt).await {
            info!("cache hit for prompt");
            return Ok(answer);
        }

        info!(provider = client.name(), "cache miss; sending prompt to completion service");
        let answer = client.complete(prompt).await?.trim().to_string();

        if let Err(e) = self.store(prompt, &answer).await {
            // The answer is still good; only persistence failed.
            warn!(path = %self.path.display(), error = %e, "failed to write answer cache");
        }
        Ok(answer)
    }

    /// Cached answer for `prompt`. Empty answers count as misses.
    pub async fn lookup(&self, prompt: &str) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.load()
            .await
            .remove(prompt)
            .filter(|answer| !answer.is_empty())
    }

    /// Insert one entry and persist the full map.
    pub async fn store(&self, prompt: &str, answer: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await;
        entries.insert(prompt.to_string(), answer.to_string());
        self.save(&entries).await
    }

    /// Number of cached prompts.
    pub async fn len(&self) -> usize {
        let _guard = self.lock.lock().await;
        self.load().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn load(&self) -> BTreeMap<String, String> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read answer cache");
                return BTreeMap::new();
            }
        };
        if data.trim().is_empty() {
            return BTreeMap::new();
        }
        serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "answer cache is corrupt; starting empty");
            BTreeMap::new()
        })
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
