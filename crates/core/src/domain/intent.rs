//! Closed intent taxonomy and the normalized classifier verdict.
//!
//! The classifier is an upstream language model; whatever it returns is folded
//! into [`ClassificationResult`] here so that routing code only ever sees a
//! bounded confidence and a known intent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OrderStatus,
    PromoRefund,
    DiscountInquiry,
    OrderCancellation,
    ReturnRequest,
    SubscriptionChanges,
    AccountCancellation,
    PaymentIssue,
    AddressChange,
    ProductQuestion,
    Escalation,
    HumanEscalation,
    General,
}

impl Intent {
    pub const ALL: [Intent; 13] = [
        Intent::OrderStatus,
        Intent::PromoRefund,
        Intent::DiscountInquiry,
        Intent::OrderCancellation,
        Intent::ReturnRequest,
        Intent::SubscriptionChanges,
        Intent::AccountCancellation,
        Intent::PaymentIssue,
        Intent::AddressChange,
        Intent::ProductQuestion,
        Intent::Escalation,
        Intent::HumanEscalation,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderStatus => "order_status",
            Self::PromoRefund => "promo_refund",
            Self::DiscountInquiry => "discount_inquiry",
            Self::OrderCancellation => "order_cancellation",
            Self::ReturnRequest => "return_request",
            Self::SubscriptionChanges => "subscription_changes",
            Self::AccountCancellation => "account_cancellation",
            Self::PaymentIssue => "payment_issue",
            Self::AddressChange => "address_change",
            Self::ProductQuestion => "product_question",
            Self::Escalation => "escalation",
            Self::HumanEscalation => "human_escalation",
            Self::General => "general",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|intent| intent.as_str() == normalized)
    }

    /// Unknown or future labels fall through to `General`.
    pub fn parse_lenient(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::General)
    }

    pub fn is_escalation_family(&self) -> bool {
        matches!(self, Self::Escalation | Self::HumanEscalation)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::OrderStatus => "where an order is, shipping or delivery updates, tracking",
            Self::PromoRefund => "refund or credit tied to a promotion, price adjustment, or overcharge",
            Self::DiscountInquiry => "asking whether a discount or promo code is available",
            Self::OrderCancellation => "cancel a specific order that has not shipped",
            Self::ReturnRequest => "return or exchange an item already received",
            Self::SubscriptionChanges => "pause, skip, resume, or change frequency of a subscription",
            Self::AccountCancellation => "close the account or end the subscription entirely",
            Self::PaymentIssue => "failed charge, double charge, card or billing problem",
            Self::AddressChange => "change the shipping address on an order or account",
            Self::ProductQuestion => "ingredients, sizing, usage, availability of a product",
            Self::Escalation => "complaint, threat, legal or safety issue that needs a person",
            Self::HumanEscalation => "explicitly asks to speak with a human, agent, or manager",
            Self::General => "anything else, greetings, thanks, unclear requests",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

pub const FALLBACK_CONFIDENCE: u8 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: Intent,
    pub confidence: u8,
    pub priority: Option<Priority>,
    pub reasoning: String,
}

impl ClassificationResult {
    /// Safe default used whenever the classifier cannot produce a verdict.
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            classification: Intent::General,
            confidence: FALLBACK_CONFIDENCE,
            priority: Some(Priority::Medium),
            reasoning: reason.into(),
        }
    }

    /// Normalizes a loosely-typed classifier payload.
    ///
    /// Missing or non-numeric confidence counts as zero; everything is clamped
    /// into 0..=100. `human_escalation` is always urgent. Returns `None` when the
    /// payload is not a JSON object or carries no classification at all.
    pub fn from_model_output(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let label = object.get("classification").and_then(Value::as_str)?;
        if label.trim().is_empty() {
            return None;
        }

        let classification = Intent::parse_lenient(label);
        let confidence = clamp_confidence(object.get("confidence"));
        let priority = if classification == Intent::HumanEscalation {
            Some(Priority::Urgent)
        } else {
            object.get("priority").and_then(Value::as_str).and_then(Priority::parse)
        };

        let mut reasoning =
            object.get("reasoning").and_then(Value::as_str).unwrap_or_default().trim().to_string();
        if let Some(priority_reasoning) = object.get("priorityReasoning").and_then(Value::as_str) {
            if !priority_reasoning.trim().is_empty() {
                if !reasoning.is_empty() {
                    reasoning.push_str(" | ");
                }
                reasoning.push_str(priority_reasoning.trim());
            }
        }

        Some(Self { classification, confidence, priority, reasoning })
    }
}

fn clamp_confidence(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().trim_end_matches('%').parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
