//! Completion service abstraction and implementations.
//!
//! Defines the [`CompletionClient`] trait (`prompt in, text out`) and two
//! HTTP implementations:
//! - **[`DeepSeekClient`]**: `POST {base}/completion` with `{prompt}`,
//!   response `{answer}`.
//! - **[`OpenAIChatClient`]**: chat completion with a system + user message
//!   pair; answer is `choices[0].message.content`. Requires `OPENAI_API_KEY`.
//!
//! Use [`create_client`] at process start so missing credentials fail fast.
//! Callers that need a different persona or sampling for one request (the
//! follow-up and memory helpers) pass [`CompletionOptions`].
//!
//! No retries: a failed call surfaces as [`CompletionError`] and is never
//! cached, so the next identical question tries the network again.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::error::CompletionError;

/// Text-in/text-out completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name for logs (`"deepseek"`, `"openai"`).
    fn name(&self) -> &str;

    /// Complete `prompt`. The returned text is untrimmed.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Complete `prompt` with per-call overrides. Providers without a
    /// system prompt or sampling controls ignore them.
    async fn complete_with(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        self.complete(prompt).await
    }
}

/// Per-call overrides of the configured system prompt and sampling.
/// `None` keeps the client's configured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn new(system_prompt: &str, max_tokens: u32, temperature: f32) -> Self {
        Self {
            system_prompt: Some(system_prompt.to_string()),
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        }
    }
}

/// Build the configured client.
///
/// # Errors
///
/// Fails for an unknown provider, or for `openai` when `OPENAI_API_KEY`
/// is not set.
pub fn create_client(config: &CompletionConfig) -> Result<Arc<dyn CompletionClient>> {
    match config.provider.as_str() {
        "deepseek" => Ok(Arc::new(DeepSeekClient::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatClient::new(config)?)),
        other => bail!(
            "Unknown completion provider: '{}'. Must be deepseek or openai.",
            other
        ),
    }
}

fn http_client(config: &CompletionConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    Ok(builder.build()?)
}

/// Read the body of a non-2xx response into a [`CompletionError::Status`].
async fn status_error(response: reqwest::Response) -> CompletionError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CompletionError::Status { status, body }
}

// ============ DeepSeek ============

/// Self-hosted completion server speaking `{prompt}` → `{answer}`.
pub struct DeepSeekClient {
    client: reqwest::Client,
    base_url: String,
}

impl DeepSeekClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.base_url(),
        })
    }
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    fn name(&self) -> &str {
        "deepseek"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        parse_deepseek_response(&json)
    }
}

fn parse_deepseek_response(json: &Value) -> Result<String, CompletionError> {
    json.get("answer")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CompletionError::Malformed("missing answer field".to_string()))
}

// ============ OpenAI ============

/// OpenAI-compatible chat completion endpoint.
pub struct OpenAIChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIChatClient {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http_client(config)?,
            base_url: config.base_url(),
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions) -> Value {
        let system = options
            .system_prompt
            .as_deref()
            .unwrap_or(&self.system_prompt);
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
            "temperature": options.temperature.unwrap_or(self.temperature),
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAIChatClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        self.complete_with(prompt, &CompletionOptions::default()).await
    }

    async fn complete_with(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let body = self.request_body(prompt, options);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_response(json: &Value) -> Result<String, CompletionError> {
    json.get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".to_string()))
}
