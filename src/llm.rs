//! Language-model invocation.
//!
//! Defines the [`LanguageModel`] trait (a single-turn, temperature-0
//! completion returning plain text) with OpenAI and Ollama backends, plus
//! [`invoke`], the counting wrapper every pipeline call site goes through
//! so token usage is accumulated per request.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::models::TokenUsage;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Approximate characters-per-token ratio (4 chars ≈ 1 token).
const CHARS_PER_TOKEN: u64 = 4;

/// Rough token count for usage accounting.
pub fn approx_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Trait for text-generation providers.
///
/// Implementations normalize whatever shape the backend returns into a
/// plain `String`; callers never see provider-specific response objects.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a single stateless completion at temperature 0.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Returns the model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;
}

/// Generate a completion and record its approximate cost into `usage`.
///
/// Prompt characters count toward `input`, response characters toward
/// `output`. This is the only call path the pipeline uses, which keeps
/// accounting uniform across the confirmation, summarization, and
/// arbitration steps.
pub async fn invoke(
    llm: &dyn LanguageModel,
    prompt: &str,
    usage: &mut TokenUsage,
) -> Result<String> {
    usage.add_input(approx_tokens(prompt));
    let answer = llm.generate(prompt).await?;
    usage.add_output(approx_tokens(&answer));
    Ok(answer)
}

/// Create the appropriate [`LanguageModel`] based on configuration.
pub fn create_language_model(config: &ProviderConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.name.as_str() {
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown provider: {}", other),
    }
}

// ============ OpenAI provider ============

/// Chat-completions backend for the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set. Retries
/// rate limits and server errors with the same backoff schedule as the
/// embedding client.
pub struct OpenAiChat {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.chat_model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            api_key,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_openai_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull the assistant text out of a chat-completions response.
fn parse_openai_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

// ============ Ollama provider ============

/// Generation backend for a local Ollama server.
pub struct OllamaChat {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.chat_model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": 0 },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
