use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use replyguard_core::config::SentimentConfig;
use replyguard_core::sentiment::{
    evaluate_override, SentimentAnalysis, SentimentLabel, SentimentOverride, SentimentScores,
};
use replyguard_core::thresholds::DecisionThresholds;

#[async_trait]
pub trait SentimentClient: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<SentimentAnalysis>;
}

/// POSTs `{"text": ...}` and expects `{sentiment, scores: {negative, neutral, positive}, confidence}`.
pub struct HttpSentimentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpSentimentClient {
    pub fn from_config(config: &SentimentConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| anyhow!("sentiment is enabled but no endpoint is configured"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build sentiment http client")?;

        Ok(Some(Self { client, endpoint, api_key: config.api_key.clone() }))
    }
}

#[async_trait]
impl SentimentClient for HttpSentimentClient {
    async fn analyze(&self, text: &str) -> Result<SentimentAnalysis> {
        let mut request = self.client.post(&self.endpoint).json(&json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("sentiment request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("sentiment endpoint returned {status}");
        }
        let payload: Value = response.json().await.context("failed to decode sentiment response")?;

        parse_payload(&payload).ok_or_else(|| anyhow!("sentiment response was malformed"))
    }
}

/// Scores may arrive as fractions (`0.92`) or percentages (`92`).
pub fn parse_payload(payload: &Value) -> Option<SentimentAnalysis> {
    let sentiment = payload.get("sentiment").and_then(Value::as_str).and_then(SentimentLabel::parse)?;
    let scores = payload.get("scores");
    let score = |name: &str| scores.and_then(|scores| scores.get(name)).map(as_percent).unwrap_or(0);

    Some(SentimentAnalysis {
        sentiment,
        scores: SentimentScores {
            negative: score("negative"),
            neutral: score("neutral"),
            positive: score("positive"),
        },
        confidence: payload.get("confidence").map(as_percent).unwrap_or(0),
    })
}

fn as_percent(value: &Value) -> u8 {
    let raw = value.as_f64().unwrap_or(0.0);
    if raw.is_nan() {
        return 0;
    }
    let scaled = if (0.0..=1.0).contains(&raw) && value.is_f64() { raw * 100.0 } else { raw };
    scaled.round().clamp(0.0, 100.0) as u8
}

/// What the engine learned about the customer's mood for one email.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SentimentAssessment {
    pub analysis: Option<SentimentAnalysis>,
    pub override_decision: Option<SentimentOverride>,
}

/// Error boundary around the sentiment service. Failures mean "no override".
pub struct SentimentAdapter {
    client: Option<Arc<dyn SentimentClient>>,
    thresholds: DecisionThresholds,
    timeout: Duration,
}

impl SentimentAdapter {
    pub fn new(
        client: Option<Arc<dyn SentimentClient>>,
        thresholds: DecisionThresholds,
        timeout: Duration,
    ) -> Self {
        Self { client, thresholds, timeout }
    }

    pub fn disabled(thresholds: DecisionThresholds) -> Self {
        Self::new(None, thresholds, Duration::from_secs(1))
    }

    pub async fn assess(&self, text: &str) -> SentimentAssessment {
        let Some(client) = &self.client else {
            return SentimentAssessment::default();
        };

        let analysis = match tokio::time::timeout(self.timeout, client.analyze(text)).await {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(error)) => {
                warn!(event_name = "sentiment.upstream_failed", error = %error, "continuing without sentiment");
                return SentimentAssessment::default();
            }
            Err(_) => {
                warn!(event_name = "sentiment.timeout", "continuing without sentiment");
                return SentimentAssessment::default();
            }
        };

        SentimentAssessment {
            override_decision: evaluate_override(&analysis, &self.thresholds),
            analysis: Some(analysis),
        }
    }
}
