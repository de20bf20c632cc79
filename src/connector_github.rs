//! GitHub repositories connector.
//!
//! Pages through `GET {api_url}/user/repos?per_page=N&page=P` until an empty
//! page comes back, keeping a fixed subset of repository fields. With
//! `include_readme`, each repository's README is fetched raw and attached
//! as `readme`; a missing README (404) or a failed fetch only skips that
//! field.
//!
//! # Configuration
//!
//! ```toml
//! [sources.github]
//! api_url = "https://api.github.com"
//! per_page = 100
//! include_readme = false
//! ```
//!
//! # Environment Variables
//!
//! - `GITHUB_TOKEN`: required; sent as `Authorization: token <TOKEN>`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::GithubSourceConfig;
use crate::error::SourceUnavailable;
use crate::models::Source;
use crate::snapshot::prune_empty;
use crate::sources::SourceReader;

const USER_AGENT: &str = concat!("portfolio-companion/", env!("CARGO_PKG_VERSION"));

pub struct GithubReader {
    config: GithubSourceConfig,
    token: String,
    client: reqwest::Client,
}

impl GithubReader {
    pub fn new(config: GithubSourceConfig, token: String) -> Result<Self> {
        Ok(Self {
            config,
            token,
            client: reqwest::Client::builder().user_agent(USER_AGENT).build()?,
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn fetch_all_repos(&self) -> Result<Vec<Value>, String> {
        let mut repos = Vec::new();
        let mut page = 1u32;
        loop {
            let url = self.api(&format!(
                "/user/repos?per_page={}&page={}",
                self.config.per_page, page
            ));
            let response = self
                .client
                .get(&url)
                .header("Authorization", format!("token {}", self.token))
                .header("Accept", "application/vnd.github.v3+json")
                .send()
                .await
                .map_err(|e| format!("GitHub API request failed: {}", e))?;
            if !response.status().is_success() {
                return Err(format!("GitHub API {}", response.status().as_u16()));
            }
            let batch: Vec<Value> = response
                .json()
                .await
                .map_err(|e| format!("GitHub API returned invalid JSON: {}", e))?;
            if batch.is_empty() {
                break;
            }
            debug!(page, repos = batch.len(), "github page fetched");
            repos.extend(batch);
            page += 1;
        }
        Ok(repos)
    }

    /// Raw README text, `None` when the repository has none.
    async fn fetch_readme(&self, full_name: &str) -> Result<Option<String>, String> {
        let response = self
            .client
            .get(self.api(&format!("/repos/{}/readme", full_name)))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3.raw")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(format!("GitHub README {}", response.status().as_u16()));
        }
        let text = response.text().await.map_err(|e| e.to_string())?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

#[async_trait]
impl SourceReader for GithubReader {
    fn source(&self) -> Source {
        Source::Github
    }

    async fn read(&self) -> Result<Value, SourceUnavailable> {
        let repos = self
            .fetch_all_repos()
            .await
            .map_err(|reason| SourceUnavailable {
                origin: Source::Github,
                reason,
            })?;

        let mut out = Vec::with_capacity(repos.len());
        for repo in &repos {
            let mut info = repo_summary(repo);
            if self.config.include_readme {
                let full_name = repo.get("full_name").and_then(Value::as_str).unwrap_or("");
                match self.fetch_readme(full_name).await {
                    Ok(Some(readme)) => {
                        info.insert("readme".to_string(), Value::String(readme));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(repo = full_name, error = %e, "README fetch failed"),
                }
            }
            out.push(prune_empty(Value::Object(info)));
        }
        Ok(Value::Array(out))
    }
}

/// The repository fields kept in the snapshot.
pub fn repo_summary(repo: &Value) -> Map<String, Value> {
    let field = |key: &str| repo.get(key).cloned().unwrap_or(Value::Null);
    let text_or_empty = |key: &str| match repo.get(key) {
        Some(Value::String(s)) => Value::String(s.clone()),
        _ => Value::String(String::new()),
    };
    let private = repo.get("private").and_then(Value::as_bool).unwrap_or(false);

    let summary = json!({
        "name": field("name"),
        "full_name": field("full_name"),
        "description": text_or_empty("description"),
        "html_url": field("html_url"),
        "language": text_or_empty("language"),
        "visibility": if private { "private" } else { "public" },
        "created_at": field("created_at"),
        "updated_at": field("updated_at"),
        "pushed_at": field("pushed_at"),
        "stargazers_count": field("stargazers_count"),
        "forks_count": field("forks_count"),
    });
    match summary {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_summary_keeps_selected_fields() {
        let repo = json!({
            "id": 1,
            "name": "repo1",
            "full_name": "me/repo1",
            "description": null,
            "html_url": "https://github.com/me/repo1",
            "language": "Rust",
            "private": true,
            "stargazers_count": 3,
            "forks_count": 0,
            "owner": {"login": "me"}
        });
        let summary = prune_empty(Value::Object(repo_summary(&repo)));
        assert_eq!(summary["name"], "repo1");
        assert_eq!(summary["visibility"], "private");
        assert_eq!(summary["stargazers_count"], 3);
        assert!(summary.get("description").is_none());
        assert!(summary.get("owner").is_none());
        assert!(summary.get("id").is_none());
    }

    #[test]
    fn test_summary_key_order() {
        let summary = repo_summary(&json!({"name": "x"}));
        let keys: Vec<_> = summary.keys().take(3).cloned().collect();
        assert_eq!(keys, vec!["name", "full_name", "description"]);
    }
}
