use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::email::EmailId;
use crate::domain::intent::Intent;
use crate::domain::rule::RuleId;
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl ApprovalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    EditedAndSent,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::EditedAndSent => "edited_and_sent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "edited_and_sent" => Some(Self::EditedAndSent),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A workflow the proposed reply depends on. It runs only when a reviewer
/// releases the item, and the reply that goes out reports what it did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalAction {
    CancelOrder { order_number: String },
    ChangeAddress { order_number: Option<String> },
    ChangeSubscription,
}

/// A proposed reply held back for a human decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub id: ApprovalId,
    pub tenant_id: TenantId,
    pub email_id: EmailId,
    pub rule_id: RuleId,
    pub classification: Intent,
    pub confidence: u8,
    pub proposed_response: String,
    /// Dropped from a still-pending item once the workflow has run, so a retried
    /// release never repeats it.
    #[serde(default)]
    pub action: Option<ApprovalAction>,
    pub status: ApprovalStatus,
    pub reviewer: Option<String>,
    pub reviewer_feedback: Option<String>,
    pub final_response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApprovalItem {
    pub fn pending(
        tenant_id: TenantId,
        email_id: EmailId,
        rule_id: RuleId,
        classification: Intent,
        confidence: u8,
        proposed_response: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ApprovalId::generate(),
            tenant_id,
            email_id,
            rule_id,
            classification,
            confidence: confidence.min(100),
            proposed_response: proposed_response.into(),
            action: None,
            status: ApprovalStatus::Pending,
            reviewer: None,
            reviewer_feedback: None,
            final_response: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
        }
    }

    pub fn with_action(mut self, action: Option<ApprovalAction>) -> Self {
        self.action = action;
        self
    }

    pub fn approve(&mut self, reviewer: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.decide(ApprovalStatus::Approved, reviewer, now)?;
        self.final_response = Some(self.proposed_response.clone());
        Ok(())
    }

    pub fn reject(
        &mut self,
        reviewer: &str,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.decide(ApprovalStatus::Rejected, reviewer, now)?;
        self.reviewer_feedback = feedback;
        Ok(())
    }

    pub fn edit_and_send(
        &mut self,
        reviewer: &str,
        edited_response: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.decide(ApprovalStatus::EditedAndSent, reviewer, now)?;
        self.final_response = Some(edited_response.into());
        Ok(())
    }

    fn decide(
        &mut self,
        next: ApprovalStatus,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidApprovalTransition { from: self.status, to: next });
        }
        self.status = next;
        self.reviewer = Some(reviewer.to_string());
        self.updated_at = now;
        self.decided_at = Some(now);
        Ok(())
    }
}
