//! Query-time retrieval over the chunk index.
//!
//! # Modes
//!
//! - **Simple**: one `multi_match` over the whole index, top `simple_top_k`
//!   hits, no weighting and no budget.
//! - **Dynamic** (default):
//!   1. Query each source independently (concurrently), up to its `max`.
//!   2. Per source, keep the first `min` hits unconditionally, then rank the
//!      rest by `score × weight` and admit them until `max` is reached.
//!   3. Merge all sources and re-sort by the *unweighted* engine score. The
//!      weight only decides admission, never final order.
//!   4. Walk the merged list accumulating `content` length and stop at the
//!      first hit that would exceed `max_prompt_chars`.
//!
//! Search failures degrade to zero hits for the affected query. During a
//! reindex the index may briefly be missing or partial; answers are then
//! built from whatever context is available.

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::config::{Config, RetrievalConfig, RetrievalMode, SourceLimits};
use crate::models::{SearchHit, Source};
use crate::store::opensearch::OpenSearchClient;
use crate::store::{SearchBackend, SearchQuery};

/// Retrieve context hits for `query` according to `config.mode`.
pub async fn retrieve(
    backend: &dyn SearchBackend,
    index: &str,
    config: &RetrievalConfig,
    query: &str,
) -> Vec<SearchHit> {
    match config.mode {
        RetrievalMode::Simple => simple_search(backend, index, query, config.simple_top_k).await,
        RetrievalMode::Dynamic => dynamic_search(backend, index, config, query).await,
    }
}

async fn simple_search(
    backend: &dyn SearchBackend,
    index: &str,
    query: &str,
    top_k: usize,
) -> Vec<SearchHit> {
    let hits = run_query(backend, index, query, None, top_k).await;
    info!(hits = hits.len(), "simple search");
    hits
}

async fn dynamic_search(
    backend: &dyn SearchBackend,
    index: &str,
    config: &RetrievalConfig,
    query: &str,
) -> Vec<SearchHit> {
    let (db, github, resume) = tokio::join!(
        run_query(backend, index, query, Some(Source::Db), config.db.max),
        run_query(backend, index, query, Some(Source::Github), config.github.max),
        run_query(backend, index, query, Some(Source::Resume), config.resume.max),
    );

    let mut merged = select_hits(db, config.db);
    merged.extend(select_hits(github, config.github));
    merged.extend(select_hits(resume, config.resume));
    sort_by_score(&mut merged);

    let (selected, total_chars) = apply_budget(merged, config.max_prompt_chars);
    info!(
        hits = selected.len(),
        chars = total_chars,
        "selected final hits"
    );
    for hit in &selected {
        debug!(id = %hit.id, source = %hit.chunk.source, score = hit.score, title = %hit.chunk.title, "hit");
    }
    selected
}

async fn run_query(
    backend: &dyn SearchBackend,
    index: &str,
    query: &str,
    source: Option<Source>,
    size: usize,
) -> Vec<SearchHit> {
    let q = SearchQuery {
        text: query.to_string(),
        source,
        size,
    };
    match backend.search(index, &q).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!(
                source = source.map(|s| s.as_str()).unwrap_or("all"),
                error = %e,
                "search failed; continuing without these hits"
            );
            Vec::new()
        }
    }
}

/// Per-source selection: hard minimum, then weighted extras up to `max`.
///
/// `hits` must be in engine relevance order. Fewer than `min` hits are all
/// kept.
pub fn select_hits(hits: Vec<SearchHit>, limits: SourceLimits) -> Vec<SearchHit> {
    let mut hits = hits;
    let split = limits.min.min(hits.len());
    let mut extras = hits.split_off(split);
    let mut selected = hits;
    selected.truncate(limits.max);

    extras.sort_by(|a, b| {
        let wa = a.score * limits.weight;
        let wb = b.score * limits.weight;
        wb.partial_cmp(&wa).unwrap_or(Ordering::Equal)
    });
    for hit in extras {
        if selected.len() >= limits.max {
            break;
        }
        selected.push(hit);
    }
    selected
}

/// Stable sort by raw engine score, best first.
pub fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Keep the longest prefix whose total content length fits `max_chars`.
///
/// Returns the kept hits and their total character count.
pub fn apply_budget(hits: Vec<SearchHit>, max_chars: usize) -> (Vec<SearchHit>, usize) {
    let mut total = 0usize;
    let mut kept = Vec::with_capacity(hits.len());
    for hit in hits {
        let len = hit.chunk.content.chars().count();
        if total + len > max_chars {
            break;
        }
        total += len;
        kept.push(hit);
    }
    (kept, total)
}

/// `companion search`: print the hits a question would be answered from.
pub async fn run_search(config: &Config, query: &str, mode: Option<RetrievalMode>) -> anyhow::Result<()> {
    let backend = OpenSearchClient::new(&config.search)?;
    let mut retrieval = config.retrieval.clone();
    if let Some(mode) = mode {
        retrieval.mode = mode;
    }

    let hits = retrieve(&backend, &config.search.index_name, &retrieval, query).await;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let section = hit.chunk.section.as_deref().unwrap_or("-");
        println!(
            "{}. [{:.2}] {} / {}  {}",
            i + 1,
            hit.score,
            hit.chunk.source,
            section,
            hit.chunk.title
        );
        println!("    {}", snippet(&hit.chunk.content, 160));
    }
    let chars: usize = hits.iter().map(|h| h.chunk.content.chars().count()).sum();
    println!("{} hits, {} chars of context", hits.len(), chars);
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
