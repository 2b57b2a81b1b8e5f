use serde::{Deserialize, Serialize};

use crate::domain::email::EmailStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Received,
    Classified,
    Escalated,
    AwaitingApproval,
    AutoResponded,
    Failed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Escalated => "escalated",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AutoResponded => "auto_responded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Escalated | Self::AwaitingApproval | Self::AutoResponded | Self::Failed)
    }

    /// Stored email status for this state. `Failed` leaves the email in `processing`.
    pub fn email_status(&self) -> EmailStatus {
        match self {
            Self::Escalated => EmailStatus::Escalated,
            Self::AwaitingApproval => EmailStatus::AwaitingApproval,
            Self::AutoResponded => EmailStatus::Resolved,
            Self::Received | Self::Classified | Self::Failed => EmailStatus::Processing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    ClassificationCompleted,
    EscalationTriggered,
    ApprovalRequired,
    ResponseDispatched,
    ResponseFailed,
    OutcomePersistFailed,
}

impl FlowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassificationCompleted => "classification_completed",
            Self::EscalationTriggered => "escalation_triggered",
            Self::ApprovalRequired => "approval_required",
            Self::ResponseDispatched => "response_dispatched",
            Self::ResponseFailed => "response_failed",
            Self::OutcomePersistFailed => "outcome_persist_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    /// Required by every event that lands in `Escalated`.
    pub escalation_reason: Option<String>,
}

impl FlowContext {
    pub fn escalating(reason: impl Into<String>) -> Self {
        Self { escalation_reason: Some(reason.into()) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    LookUpRule,
    CreateEscalation,
    CreateApprovalItem,
    MarkResolved,
    IncrementRuleTrigger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: FlowState,
    pub to: FlowState,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
