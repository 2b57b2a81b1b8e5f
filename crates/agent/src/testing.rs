//! Fakes shared by the runtime and desk tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use replyguard_core::domain::email::InboundEmail;
use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::tenant::TenantId;
use replyguard_core::sentiment::SentimentAnalysis;
use replyguard_core::thresholds::DecisionThresholds;

use crate::llm::LlmClient;
use crate::runtime::{DecisionRuntime, Repositories, RuntimeOptions};
use crate::sentiment::{SentimentAdapter, SentimentClient};
use crate::tools::{
    Collaborators, EmailDispatcher, OrderDetails, OrderLookup, OutboundEmail, SubscriptionManager,
    WorkflowOutcome,
};

/// Answers prompts from a queue; an empty queue is an upstream failure.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedLlm {
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        Self { replies: Mutex::new(replies.into_iter().collect()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        let next = self.replies.lock().map_err(|_| anyhow!("llm script poisoned"))?.pop_front();
        next.ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

pub fn verdict(intent: Intent, confidence: u8) -> String {
    json!({
        "classification": intent.as_str(),
        "confidence": confidence,
        "reasoning": "scripted",
        "priority": "medium",
    })
    .to_string()
}

pub struct FixedSentiment(pub SentimentAnalysis);

#[async_trait]
impl SentimentClient for FixedSentiment {
    async fn analyze(&self, _text: &str) -> Result<SentimentAnalysis> {
        Ok(self.0)
    }
}

pub struct RecordingDispatcher {
    accept: bool,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingDispatcher {
    pub fn accepting() -> Self {
        Self { accept: true, sent: Mutex::new(Vec::new()) }
    }

    pub fn refusing() -> Self {
        Self { accept: false, sent: Mutex::new(Vec::new()) }
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailDispatcher for RecordingDispatcher {
    async fn send(&self, email: &OutboundEmail) -> Result<bool> {
        if self.accept {
            self.sent.lock().map_err(|_| anyhow!("dispatcher poisoned"))?.push(email.clone());
        }
        Ok(self.accept)
    }
}

pub struct StubOrders {
    pub total: Decimal,
}

#[async_trait]
impl OrderLookup for StubOrders {
    async fn find_order(&self, _tenant_id: &TenantId, order_number: &str) -> Result<Option<OrderDetails>> {
        Ok(Some(OrderDetails {
            order_number: order_number.to_string(),
            status: "in transit".to_string(),
            total: self.total,
            carrier: Some("UPS".to_string()),
            tracking_number: Some("1Z999".to_string()),
            tracking_url: None,
            estimated_delivery: None,
            carrier_prediction: None,
        }))
    }

    async fn completed_order_count(&self, _tenant_id: &TenantId, _customer: &str) -> Result<u32> {
        Ok(2)
    }
}

/// Replies with whatever the subscription platform would say.
pub struct ScriptedSubscriptions(pub &'static str);

#[async_trait]
impl SubscriptionManager for ScriptedSubscriptions {
    async fn apply_change(&self, _tenant_id: &TenantId, _customer: &str, _request: &str) -> Result<WorkflowOutcome> {
        if self.0.is_empty() {
            bail!("subscription platform unavailable");
        }
        Ok(WorkflowOutcome { success: true, message: self.0.to_string() })
    }
}

/// Applies every change it is asked for and counts them.
#[derive(Clone, Default)]
pub struct CountingSubscriptions {
    calls: Arc<AtomicUsize>,
}

impl CountingSubscriptions {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubscriptionManager for CountingSubscriptions {
    async fn apply_change(&self, _tenant_id: &TenantId, _customer: &str, _request: &str) -> Result<WorkflowOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(WorkflowOutcome { success: true, message: "Your plan now renews annually.".to_string() })
    }
}

pub struct Harness {
    pub runtime: DecisionRuntime,
    pub repos: Repositories,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub struct HarnessBuilder {
    llm_replies: Vec<String>,
    sentiment: Option<SentimentAnalysis>,
    dispatcher: RecordingDispatcher,
    collaborators: Collaborators,
    repos: Repositories,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let mut collaborators = Collaborators::unconfigured();
        collaborators.orders = Arc::new(StubOrders { total: Decimal::new(40, 0) });
        Self {
            llm_replies: Vec::new(),
            sentiment: None,
            dispatcher: RecordingDispatcher::accepting(),
            collaborators,
            repos: Repositories::in_memory(),
        }
    }

    pub fn llm(mut self, reply: String) -> Self {
        self.llm_replies.push(reply);
        self
    }

    pub fn sentiment(mut self, analysis: SentimentAnalysis) -> Self {
        self.sentiment = Some(analysis);
        self
    }

    pub fn dispatcher(mut self, dispatcher: RecordingDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn subscriptions(mut self, subscriptions: impl SubscriptionManager + 'static) -> Self {
        self.collaborators.subscriptions = Arc::new(subscriptions);
        self
    }

    pub fn repos(mut self, repos: Repositories) -> Self {
        self.repos = repos;
        self
    }

    pub fn build(self) -> Harness {
        let dispatcher = Arc::new(self.dispatcher);
        let mut collaborators = self.collaborators;
        collaborators.dispatcher = dispatcher.clone();

        let thresholds = DecisionThresholds::default();
        let sentiment = match self.sentiment {
            Some(analysis) => SentimentAdapter::new(
                Some(Arc::new(FixedSentiment(analysis))),
                thresholds,
                Duration::from_secs(1),
            ),
            None => SentimentAdapter::disabled(thresholds),
        };

        let runtime = DecisionRuntime::new(
            self.repos.clone(),
            collaborators,
            Arc::new(ScriptedLlm::new(self.llm_replies)),
            sentiment,
            RuntimeOptions { thresholds, classifier_timeout: Duration::from_secs(1) },
        )
        .expect("runtime builds");

        Harness { runtime, repos: self.repos, dispatcher }
    }
}

pub fn tenant() -> TenantId {
    TenantId("tenant-1".to_string())
}

pub fn inbound(message_id: &str, subject: &str, body: &str) -> InboundEmail {
    InboundEmail {
        from_email: "Customer <customer@example.com>".to_string(),
        to_email: "help@shop.io".to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        message_id: message_id.to_string(),
    }
}
