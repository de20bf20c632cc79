//! The read path: question → retrieval → prompt → cached answer.
//!
//! [`RetrievalContext`] owns every handle the read path needs, so the HTTP
//! server, the CLI and tests each build their own instead of sharing
//! process-wide state.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cache::AnswerCache;
use crate::completion::{create_client, CompletionClient, CompletionOptions};
use crate::config::{Config, RetrievalConfig};
use crate::error::{AskError, CompletionError};
use crate::models::SearchHit;
use crate::prompt::{
    build_prompt, clean_rewrite, follow_up_prompt, memory_update_prompt, optimize_query_prompt,
    parse_suggestions, with_memory, FOLLOW_UP_SYSTEM, MEMORY_SYSTEM, REWRITE_SYSTEM,
};
use crate::search::retrieve;
use crate::store::opensearch::OpenSearchClient;
use crate::store::SearchBackend;

#[derive(Clone)]
pub struct RetrievalContext {
    pub backend: Arc<dyn SearchBackend>,
    pub cache: Arc<AnswerCache>,
    pub completion: Arc<dyn CompletionClient>,
    pub index_name: String,
    pub retrieval: RetrievalConfig,
}

impl RetrievalContext {
    /// Build the production context: OpenSearch backend, on-disk cache and
    /// the configured completion client.
    ///
    /// Fails immediately when completion credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let completion = create_client(&config.completion)?;
        let backend: Arc<dyn SearchBackend> = Arc::new(OpenSearchClient::new(&config.search)?);
        Ok(Self {
            backend,
            cache: Arc::new(AnswerCache::new(config.snapshots.cache_path())),
            completion,
            index_name: config.search.index_name.clone(),
            retrieval: config.retrieval.clone(),
        })
    }

    /// Selected context hits for `query`.
    pub async fn retrieve(&self, query: &str) -> Vec<SearchHit> {
        retrieve(
            self.backend.as_ref(),
            &self.index_name,
            &self.retrieval,
            query,
        )
        .await
    }

    /// Answer `query` from indexed context.
    ///
    /// # Errors
    ///
    /// [`AskError::EmptyQuery`] for blank input (no search is run), or
    /// [`AskError::Completion`] when the completion service fails.
    pub async fn ask(&self, query: &str) -> Result<String, AskError> {
        self.ask_with_memory(query, None).await
    }

    /// Answer `query` with an optional conversation memory prefixed to the
    /// prompt. Retrieval uses the query alone.
    ///
    /// The query is only trimmed for validation; the raw text goes into the
    /// prompt, and so into the cache key.
    pub async fn ask_with_memory(
        &self,
        query: &str,
        memory: Option<&str>,
    ) -> Result<String, AskError> {
        if query.trim().is_empty() {
            return Err(AskError::EmptyQuery);
        }
        let hits = self.retrieve(query).await;
        info!(hits = hits.len(), memory = memory.is_some(), "building prompt");
        let prompt = with_memory(memory, build_prompt(hits.iter().map(|h| &h.chunk), query));
        Ok(self.cache.get_answer(self.completion.as_ref(), &prompt).await?)
    }

    /// Up to three follow-up questions for a finished exchange. Not cached.
    pub async fn suggest_follow_ups(
        &self,
        query: &str,
        answer: &str,
    ) -> Result<Vec<String>, CompletionError> {
        let raw = self
            .completion
            .complete_with(
                &follow_up_prompt(query, answer),
                &CompletionOptions::new(FOLLOW_UP_SYSTEM, 60, 0.6),
            )
            .await?;
        Ok(parse_suggestions(&raw))
    }

    /// Fold one exchange into the running conversation memory and return the
    /// new 2-3 sentence summary. Not cached.
    pub async fn update_memory(
        &self,
        previous: &str,
        query: &str,
        answer: &str,
    ) -> Result<String, CompletionError> {
        let raw = self
            .completion
            .complete_with(
                &memory_update_prompt(previous, query, answer),
                &CompletionOptions::new(MEMORY_SYSTEM, 150, 0.2),
            )
            .await?;
        Ok(raw.trim().to_string())
    }

    /// Rewrite a follow-up question into a standalone search query.
    ///
    /// Without memory there is nothing to resolve, so the trimmed query comes
    /// back unchanged and no completion call is made. A blank rewrite also
    /// falls back to the query.
    pub async fn optimize_query(&self, memory: &str, query: &str) -> Result<String, AskError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AskError::EmptyQuery);
        }
        if memory.trim().is_empty() {
            return Ok(query.to_string());
        }
        let raw = self
            .completion
            .complete_with(
                &optimize_query_prompt(memory, query),
                &CompletionOptions::new(REWRITE_SYSTEM, 60, 0.2),
            )
            .await?;
        Ok(clean_rewrite(&raw).unwrap_or_else(|| query.to_string()))
    }
}

/// `companion ask`: answer one question and print it.
pub async fn run_ask(config: &Config, query: &str, memory: Option<&str>) -> Result<()> {
    let ctx = RetrievalContext::from_config(config)?;
    let answer = ctx.ask_with_memory(query, memory).await?;
    println!("{}", answer);
    Ok(())
}
