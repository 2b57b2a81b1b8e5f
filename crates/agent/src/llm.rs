use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use replyguard_core::config::{LlmConfig, LlmProvider};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

/// Single-turn completion client for the configured provider.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        match self.provider {
            LlmProvider::OpenAi => {
                let mut request = self
                    .client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .json(&json!({
                        "model": self.model,
                        "temperature": 0,
                        "messages": [{ "role": "user", "content": prompt }],
                    }));
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key.expose_secret());
                }
                request
            }
            LlmProvider::Anthropic => {
                let mut request = self
                    .client
                    .post(format!("{}/v1/messages", self.base_url))
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&json!({
                        "model": self.model,
                        "max_tokens": MAX_TOKENS,
                        "messages": [{ "role": "user", "content": prompt }],
                    }));
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key.expose_secret());
                }
                request
            }
            LlmProvider::Ollama => self.client.post(format!("{}/api/generate", self.base_url)).json(
                &json!({ "model": self.model, "prompt": prompt, "stream": false }),
            ),
        }
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        let response = self
            .request(prompt)
            .send()
            .await
            .with_context(|| format!("{} completion request failed", self.provider.as_str()))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} completion endpoint returned {status}", self.provider.as_str());
        }

        let payload: Value =
            response.json().await.context("failed to decode completion response")?;
        extract_completion_text(self.provider, &payload)
    }
}

/// Pulls the generated text out of a provider response body.
pub fn extract_completion_text(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload.pointer("/choices/0/message/content").and_then(Value::as_str),
        LlmProvider::Anthropic => payload.pointer("/content/0/text").and_then(Value::as_str),
        LlmProvider::Ollama => payload.get("response").and_then(Value::as_str),
    };

    text.map(str::to_string)
        .ok_or_else(|| anyhow!("{} response carried no completion text", provider.as_str()))
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.complete_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(error) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.completion.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "retrying llm completion"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use replyguard_core::config::LlmProvider;

    use super::extract_completion_text;

    #[test]
    fn completion_text_is_read_from_each_provider_shape() {
        let openai = json!({ "choices": [{ "message": { "content": "{\"a\":1}" } }] });
        let anthropic = json!({ "content": [{ "type": "text", "text": "hello" }] });
        let ollama = json!({ "response": "hi", "done": true });

        assert_eq!(extract_completion_text(LlmProvider::OpenAi, &openai).expect("openai"), "{\"a\":1}");
        assert_eq!(extract_completion_text(LlmProvider::Anthropic, &anthropic).expect("anthropic"), "hello");
        assert_eq!(extract_completion_text(LlmProvider::Ollama, &ollama).expect("ollama"), "hi");
    }

    #[test]
    fn missing_text_is_an_error() {
        let error = extract_completion_text(LlmProvider::OpenAi, &json!({ "choices": [] }))
            .expect_err("no choices");
        assert!(error.to_string().contains("no completion text"));
    }
}
