use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::email::EmailId;
use crate::domain::intent::{Intent, Priority};
use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(pub String);

impl EscalationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    InProgress,
    Resolved,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: EscalationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Resolved)
                | (Self::InProgress, Self::Resolved)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationItem {
    pub id: EscalationId,
    pub tenant_id: TenantId,
    pub email_id: EmailId,
    pub classification: Option<Intent>,
    pub priority: Priority,
    pub reason: String,
    pub status: EscalationStatus,
    pub assignee: Option<String>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationItem {
    pub fn pending(
        tenant_id: TenantId,
        email_id: EmailId,
        classification: Option<Intent>,
        priority: Priority,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EscalationId::generate(),
            tenant_id,
            email_id,
            classification,
            priority,
            reason: reason.into(),
            status: EscalationStatus::Pending,
            assignee: None,
            resolution_note: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn start(&mut self, assignee: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(EscalationStatus::InProgress, now)?;
        self.assignee = Some(assignee.to_string());
        Ok(())
    }

    pub fn resolve(
        &mut self,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(EscalationStatus::Resolved, now)?;
        self.resolution_note = note;
        self.resolved_at = Some(now);
        Ok(())
    }

    fn transition_to(
        &mut self,
        next: EscalationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidEscalationTransition { from: self.status, to: next });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
