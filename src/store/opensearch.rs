//! OpenSearch / Elasticsearch REST backend.
//!
//! Speaks the plain JSON API over `reqwest`; no engine-specific client
//! library. Basic auth is sent when a username is configured.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use super::{BulkOutcome, HealthStatus, SearchBackend, SearchQuery};
use crate::config::SearchConfig;
use crate::models::{Chunk, SearchHit};

pub struct OpenSearchClient {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let mut builder = Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.resolved_password(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct HealthBody {
    status: HealthStatus,
}

#[derive(Deserialize)]
struct SearchBody {
    hits: HitsBody,
}

#[derive(Deserialize)]
struct HitsBody {
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Chunk,
}

#[async_trait]
impl SearchBackend for OpenSearchClient {
    async fn health(&self, index: Option<&str>) -> Result<HealthStatus> {
        let path = match index {
            Some(index) => format!("_cluster/health/{}", index),
            None => "_cluster/health".to_string(),
        };
        let resp = self.authed(self.client.get(self.url(&path))).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("health check returned {}: {}", status, body);
        }
        let body: HealthBody = resp.json().await.context("invalid health response")?;
        Ok(body.status)
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let resp = self.authed(self.client.head(self.url(index))).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => bail!("index exists check for '{}' returned {}", index, other),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let resp = self.authed(self.client.delete(self.url(index))).send().await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        bail!("delete index '{}' returned {}: {}", index, status, body)
    }

    async fn create_index(&self, index: &str, mapping: &Value) -> Result<()> {
        let body = serde_json::json!({ "mappings": mapping });
        let resp = self
            .authed(self.client.put(self.url(index)))
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("create index '{}' returned {}: {}", index, status, body);
        }
        Ok(())
    }

    async fn bulk_index(&self, index: &str, docs: &[(String, Chunk)]) -> Result<BulkOutcome> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let mut ndjson = String::new();
        for (id, chunk) in docs {
            let action = serde_json::json!({ "index": { "_index": index, "_id": id } });
            ndjson.push_str(&action.to_string());
            ndjson.push('\n');
            ndjson.push_str(&serde_json::to_string(chunk)?);
            ndjson.push('\n');
        }

        let resp = self
            .authed(self.client.post(self.url("_bulk?refresh=true")))
            .header("Content-Type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("bulk insert returned {}: {}", status, body);
        }

        let body: Value = resp.json().await.context("invalid bulk response")?;
        Ok(parse_bulk_response(&body, docs.len()))
    }

    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let resp = self
            .authed(self.client.post(self.url(&format!("{}/_search", index))))
            .json(&query.to_body())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("search on '{}' returned {}: {}", index, status, body);
        }

        let body: SearchBody = resp.json().await.context("invalid search response")?;
        Ok(body
            .hits
            .hits
            .into_iter()
            .map(|h| SearchHit {
                id: h.id,
                score: h.score.unwrap_or(0.0),
                chunk: h.source,
            })
            .collect())
    }
}

/// Collect per-document failures from a `_bulk` response.
fn parse_bulk_response(body: &Value, submitted: usize) -> BulkOutcome {
    let mut failed = Vec::new();
    if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        let items = body.get("items").and_then(Value::as_array);
        for item in items.into_iter().flatten() {
            let Some(action) = item.get("index") else {
                continue;
            };
            if let Some(error) = action.get("error") {
                let id = action
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string();
                let reason = error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string());
                failed.push((id, reason));
            }
        }
    }

    BulkOutcome {
        indexed: submitted.saturating_sub(failed.len()),
        failed,
    }
}
