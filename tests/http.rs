//! HTTP API over the in-memory backend, served on an ephemeral port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use portfolio_companion::cache::AnswerCache;
use portfolio_companion::completion::CompletionClient;
use portfolio_companion::config::{RetrievalConfig, SnapshotConfig};
use portfolio_companion::context::RetrievalContext;
use portfolio_companion::error::{CompletionError, SourceUnavailable};
use portfolio_companion::models::Source;
use portfolio_companion::scheduler::ReindexJob;
use portfolio_companion::server::{router, AppState};
use portfolio_companion::snapshot::write_snapshot;
use portfolio_companion::sources::SourceReader;
use portfolio_companion::store::memory::MemoryIndex;
use portfolio_companion::store::HealthStatus;
use serde_json::{json, Value};
use tempfile::TempDir;

/// Replies by prompt kind: follow-ups get a numbered list, memory updates a
/// summary, query rewrites a quoted query, everything else a fixed answer.
/// Fails when the prompt mentions "explode".
struct ScriptedClient {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("explode") {
            return Err(CompletionError::Malformed("no answer".to_string()));
        }
        if prompt.contains("follow-up questions") {
            return Ok("1. What stack?\n2) Is it deployed?\n- Who uses it?\n4. Extra".to_string());
        }
        if prompt.contains("Update the conversation memory") {
            return Ok(" The user asked what Chatbot is. \n".to_string());
        }
        if prompt.contains("standalone search query") {
            return Ok("\"Chatbot tech stack\"".to_string());
        }
        Ok(" Chatbot is an AI project. ".to_string())
    }
}

/// Live github listing that differs from the seeded snapshot.
struct GithubListing;

#[async_trait]
impl SourceReader for GithubListing {
    fn source(&self) -> Source {
        Source::Github
    }

    async fn read(&self) -> Result<Value, SourceUnavailable> {
        Ok(json!([{"name": "repo2", "description": "live", "language": "Rust"}]))
    }
}

struct TestServer {
    base: String,
    backend: Arc<MemoryIndex>,
    client: Arc<ScriptedClient>,
    _tmp: TempDir,
}

async fn start_server() -> TestServer {
    let tmp = TempDir::new().unwrap();
    let snapshots = SnapshotConfig {
        dir: tmp.path().join("data"),
        max_age_hours: 24,
    };
    write_snapshot(
        &tmp.path().join("data").join("db-context.json"),
        &json!({"projectTable": [{
            "projectTitle": "Chatbot",
            "projectTagline": "AI",
            "projectParagraphs": ["Built with search."]
        }]}),
    )
    .unwrap();
    write_snapshot(
        &tmp.path().join("data").join("github-context.json"),
        &json!([{"name": "repo1", "description": "demo", "language": "Go"}]),
    )
    .unwrap();

    let backend = Arc::new(MemoryIndex::new());
    let client = Arc::new(ScriptedClient {
        calls: AtomicUsize::new(0),
        prompts: Mutex::new(Vec::new()),
    });
    let ctx = RetrievalContext {
        backend: backend.clone(),
        cache: Arc::new(AnswerCache::new(snapshots.cache_path())),
        completion: client.clone(),
        index_name: "context-index".to_string(),
        retrieval: RetrievalConfig::default(),
    };
    let job = Arc::new(ReindexJob {
        backend: backend.clone(),
        readers: vec![Arc::new(GithubListing)],
        index_name: "context-index".to_string(),
        snapshots,
        refresh_snapshots: false,
        health_poll: Duration::from_millis(5),
        health_timeout: Duration::from_millis(50),
        interval: Duration::from_secs(3600),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(AppState::new(ctx, job));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        backend,
        client,
        _tmp: tmp,
    }
}

async fn post(server: &TestServer, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", server.base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_reports_version() {
    let server = start_server().await;
    let body: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_create_index_then_ask() {
    let server = start_server().await;

    let (status, body) = post(&server, "/api/ai/create-index", json!({})).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["chunks"], 2);
    // The fresh github snapshot was regenerated from the live listing.
    let titles: Vec<String> = server
        .backend
        .documents("context-index")
        .unwrap()
        .into_iter()
        .map(|(_, chunk)| chunk.title)
        .collect();
    assert_eq!(titles, vec!["Chatbot", "repo2"]);

    let (status, body) = post(&server, "/api/ai/ask-chat", json!({"query": "Tell me about Chatbot"})).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["answer"], "Chatbot is an AI project.");

    // Second identical question is served from the cache.
    post(&server, "/api/ai/ask-chat", json!({"query": "Tell me about Chatbot"})).await;
    assert_eq!(server.client.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_query_is_bad_request() {
    let server = start_server().await;
    let (status, body) = post(&server, "/api/ai/ask-chat", json!({"query": "   "})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(server.client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_completion_failure_is_bad_gateway() {
    let server = start_server().await;
    let (status, body) = post(&server, "/api/ai/ask-chat", json!({"query": "explode"})).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "completion_failed");
}

#[tokio::test]
async fn test_create_index_with_unhealthy_engine_is_internal_error() {
    let server = start_server().await;
    server.backend.set_health(HealthStatus::Red);
    let (status, body) = post(&server, "/api/ai/create-index", json!({})).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "internal");
}

#[tokio::test]
async fn test_follow_ups_are_parsed() {
    let server = start_server().await;
    let (status, body) = post(
        &server,
        "/api/ai/suggest-follow-ups",
        json!({"query": "What is Chatbot?", "response": "An AI project."}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(
        body["suggestions"],
        json!(["What stack?", "Is it deployed?", "Who uses it?"])
    );

    let (status, _) = post(&server, "/api/ai/suggest-follow-ups", json!({"query": "q"})).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_ask_with_conversation_memory() {
    let server = start_server().await;
    post(&server, "/api/ai/create-index", json!({})).await;

    let (status, body) = post(
        &server,
        "/api/ai/ask-chat",
        json!({"query": "Tell me about Chatbot", "conversationMemory": "User likes AI."}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    let prompts = server.client.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("MEMORY:\nUser likes AI.\n\n"));
    assert!(prompts[0].contains("[DB] Chatbot: AI Built with search."));
}

#[tokio::test]
async fn test_snapshot_memory_update() {
    let server = start_server().await;
    let (status, body) = post(
        &server,
        "/api/ai/snapshot-memory-update",
        json!({"query": "What is Chatbot?", "response": "An AI project."}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["memory"], "The user asked what Chatbot is.");
    assert!(server.client.prompts.lock().unwrap()[0].starts_with("Previous memory: (none)"));

    let (status, body) = post(
        &server,
        "/api/ai/snapshot-memory-update",
        json!({"previousMemory": "x", "query": "q"}),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_optimize_query() {
    let server = start_server().await;
    let (status, body) = post(
        &server,
        "/api/ai/optimize-query",
        json!({"query": "what stack does it use?", "conversationMemory": "User asked about Chatbot."}),
    )
    .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["optimizedQuery"], "Chatbot tech stack");

    let (status, body) = post(&server, "/api/ai/optimize-query", json!({"query": " rust "})).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["optimizedQuery"], "rust");
    assert_eq!(server.client.calls.load(Ordering::SeqCst), 1);

    let (status, _) = post(&server, "/api/ai/optimize-query", json!({"query": ""})).await;
    assert_eq!(status, 400);
}
