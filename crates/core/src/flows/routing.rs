//! Pure routing decisions made from the `Classified` state.

use serde::{Deserialize, Serialize};

use crate::domain::intent::{ClassificationResult, Intent, Priority};
use crate::domain::rule::AutomationRule;
use crate::sentiment::SentimentOverride;
use crate::thresholds::DecisionThresholds;

pub const NO_MATCHING_RULE: &str = "no matching rule";
pub const FAILED_TO_SEND: &str = "failed to send";
pub const BLOCKED_BY_SAFETY_GUARD: &str = "blocked by safety guard";
pub const HOLDING_REPLY_SENT: &str = "holding reply sent";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub priority: Priority,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Escalate(EscalationDecision),
    LookUpRule,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleRoute {
    QueueForApproval,
    AutoRespond,
}

/// Step 1: escalate iff confidence is below the threshold, the intent is in the
/// escalation family, or the sentiment override fired.
pub fn route(
    classification: &ClassificationResult,
    sentiment: Option<&SentimentOverride>,
    thresholds: &DecisionThresholds,
) -> Route {
    if let Some(sentiment) = sentiment {
        return Route::Escalate(EscalationDecision {
            priority: escalation_priority(classification, Some(sentiment), thresholds),
            reason: sentiment.reason.clone(),
        });
    }

    let reason = if classification.classification.is_escalation_family() {
        Some(format!("classified as {}", classification.classification))
    } else if classification.confidence < thresholds.escalation_confidence {
        Some(format!(
            "low confidence ({}% < {}%)",
            classification.confidence, thresholds.escalation_confidence
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Route::Escalate(EscalationDecision {
            priority: escalation_priority(classification, None, thresholds),
            reason,
        }),
        None => Route::LookUpRule,
    }
}

/// Steps 2 and 3: the matched rule decides between approval and auto-response.
pub fn route_with_rule(rule: Option<&AutomationRule>) -> Result<RuleRoute, &'static str> {
    match rule {
        None => Err(NO_MATCHING_RULE),
        Some(rule) if rule.requires_approval => Ok(RuleRoute::QueueForApproval),
        Some(_) => Ok(RuleRoute::AutoRespond),
    }
}

/// `human_escalation` is urgent whatever the sentiment says. Otherwise the
/// sentiment override wins, then the classifier's own priority, then the
/// confidence fallback.
pub fn escalation_priority(
    classification: &ClassificationResult,
    sentiment: Option<&SentimentOverride>,
    thresholds: &DecisionThresholds,
) -> Priority {
    if classification.classification == Intent::HumanEscalation {
        return Priority::Urgent;
    }
    if let Some(sentiment) = sentiment {
        return sentiment.priority;
    }
    if let Some(priority) = classification.priority {
        return priority;
    }
    if classification.confidence < thresholds.low_confidence_high_priority {
        Priority::High
    } else {
        Priority::Medium
    }
}
