use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::Intent;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub String);

impl EmailId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Provider-assigned message id. Unique per tenant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Processing,
    Resolved,
    Escalated,
    AwaitingApproval,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
            Self::AwaitingApproval => "awaiting_approval",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "resolved" => Some(Self::Resolved),
            "escalated" => Some(Self::Escalated),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            _ => None,
        }
    }
}

/// Normalized event handed over by the ingestion collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEmail {
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub tenant_id: TenantId,
    pub message_id: MessageId,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub classification: Option<Intent>,
    pub confidence: Option<u8>,
    pub escalation_reason: Option<String>,
    pub thread_id: Option<ThreadId>,
    pub thread_position: Option<u32>,
    pub is_thread_start: bool,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Email {
    pub fn received(tenant_id: TenantId, inbound: InboundEmail, now: DateTime<Utc>) -> Self {
        Self {
            id: EmailId::generate(),
            tenant_id,
            message_id: MessageId(inbound.message_id),
            from_address: normalize_address(&inbound.from_email),
            to_address: normalize_address(&inbound.to_email),
            subject: inbound.subject,
            body: inbound.body,
            status: EmailStatus::Processing,
            classification: None,
            confidence: None,
            escalation_reason: None,
            thread_id: None,
            thread_position: None,
            is_thread_start: false,
            created_at: now,
            processed_at: None,
        }
    }

    /// True when the two addresses are the participants of this email, in either direction.
    pub fn is_between(&self, first: &str, second: &str) -> bool {
        let first = normalize_address(first);
        let second = normalize_address(second);
        (self.from_address == first && self.to_address == second)
            || (self.from_address == second && self.to_address == first)
    }
}

/// Lowercases and strips an optional display name (`Jane <jane@shop.com>`).
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    };
    address.trim().to_ascii_lowercase()
}
