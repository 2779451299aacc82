use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use closer_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 4096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Overrides the configured model for this call only.
    pub model: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn default_model(&self) -> &str;
}

/// OpenAI's `chat/completions` shape, which Ollama also serves.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, model: model.into() }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        let mut builder = self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let response = builder.send().await.context("chat completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("chat completion returned HTTP {status}: {}", truncate(&text));
        }

        let parsed: ChatResponse =
            response.json().await.context("chat completion response was not JSON")?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completion returned no content"))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, model: model.into() }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = json!({
            "model": model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.user }],
        });

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("anthropic returned HTTP {status}: {}", truncate(&text));
        }

        let parsed: MessagesResponse =
            response.json().await.context("anthropic response was not JSON")?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();
        if text.trim().is_empty() {
            bail!("anthropic returned no text content");
        }
        Ok(text)
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Builds the configured client. A missing key is only an error for hosted providers.
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("could not build LLM http client")?;
    let base_url = config.effective_base_url();
    let api_key = config.require_api_key().map_err(|error| anyhow!(error))?.cloned();

    Ok(match config.provider {
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            Arc::new(ChatCompletionsClient::new(http, base_url, api_key, config.model.clone()))
        }
        LlmProvider::Anthropic => {
            let api_key = api_key.ok_or_else(|| anyhow!("anthropic requires llm.api_key"))?;
            Arc::new(AnthropicClient::new(http, base_url, api_key, config.model.clone()))
        }
    })
}

fn truncate(text: &str) -> String {
    text.chars().take(300).collect()
}
