use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use replyguard_agent::tools::{EmailDispatcher, OutboundEmail};
use replyguard_core::config::DispatchConfig;
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

/// Hands rendered replies to the outbound mail service as JSON.
///
/// A 4xx answer is a refusal of this message; anything else unexpected is a
/// transport error.
pub struct WebhookDispatcher {
    client: Client,
    webhook_url: String,
    api_key: Option<SecretString>,
}

impl WebhookDispatcher {
    pub fn from_config(config: &DispatchConfig) -> Result<Option<Self>> {
        let Some(webhook_url) = config.webhook_url.clone() else {
            return Ok(None);
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build dispatch http client")?;

        Ok(Some(Self { client, webhook_url, api_key: config.api_key.clone() }))
    }
}

#[async_trait]
impl EmailDispatcher for WebhookDispatcher {
    async fn send(&self, email: &OutboundEmail) -> Result<bool> {
        let mut request = self.client.post(&self.webhook_url).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.context("dispatch webhook request failed")?;
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status.is_client_error() {
            warn!(
                event_name = "dispatch.webhook.refused",
                tenant_id = %email.tenant_id,
                status = status.as_u16(),
                "outbound mail service refused the message"
            );
            return Ok(false);
        }

        bail!("dispatch webhook returned {status}")
    }
}

#[cfg(test)]
mod tests {
    use replyguard_core::config::DispatchConfig;

    use super::WebhookDispatcher;

    #[test]
    fn no_webhook_means_no_dispatcher() {
        let config = DispatchConfig { webhook_url: None, api_key: None, timeout_secs: 10 };
        assert!(WebhookDispatcher::from_config(&config).expect("config").is_none());
    }

    #[test]
    fn webhook_url_builds_dispatcher() {
        let config = DispatchConfig {
            webhook_url: Some("https://mail.example.com/send".to_string()),
            api_key: Some("key".to_string().into()),
            timeout_secs: 10,
        };
        let dispatcher = WebhookDispatcher::from_config(&config).expect("config").expect("dispatcher");
        assert_eq!(dispatcher.webhook_url, "https://mail.example.com/send");
    }
}
