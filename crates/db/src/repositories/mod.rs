use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;

use replyguard_core::audit::ActivityLogEntry;
use replyguard_core::domain::approval::{ApprovalId, ApprovalItem, ApprovalStatus};
use replyguard_core::domain::email::{Email, EmailId, MessageId, ThreadId};
use replyguard_core::domain::escalation::{EscalationId, EscalationItem};
use replyguard_core::domain::rule::{AutomationRule, RuleId};
use replyguard_core::domain::tenant::{TenantId, TenantSettings};
use replyguard_core::domain::thread::ThreadPlacement;

pub mod activity;
pub mod approval;
pub mod email;
pub mod escalation;
pub mod memory;
pub mod rule;
pub mod tenant;

pub use activity::SqlActivityLogRepository;
pub use approval::SqlApprovalRepository;
pub use email::SqlEmailRepository;
pub use escalation::SqlEscalationRepository;
pub use memory::{
    InMemoryActivityLogRepository, InMemoryApprovalRepository, InMemoryEmailRepository,
    InMemoryEscalationRepository, InMemoryRuleRepository, InMemoryTenantSettingsRepository,
};
pub use rule::SqlRuleRepository;
pub use tenant::SqlTenantSettingsRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl RepositoryError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

#[async_trait]
pub trait EmailRepository: Send + Sync {
    /// Fails with [`RepositoryError::Duplicate`] when `(message_id, tenant_id)` already exists.
    async fn insert(&self, email: Email) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &EmailId) -> Result<Option<Email>, RepositoryError>;
    async fn find_by_message_id(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
    ) -> Result<Option<Email>, RepositoryError>;
    /// Emails exchanged between the two addresses in either direction, newest first.
    async fn list_between(
        &self,
        tenant_id: &TenantId,
        first: &str,
        second: &str,
        limit: u32,
    ) -> Result<Vec<Email>, RepositoryError>;
    async fn list_thread(
        &self,
        tenant_id: &TenantId,
        thread_id: &ThreadId,
    ) -> Result<Vec<Email>, RepositoryError>;
    async fn update_thread(
        &self,
        id: &EmailId,
        placement: &ThreadPlacement,
    ) -> Result<(), RepositoryError>;
    /// Persists status, classification, confidence, escalation reason and processed time.
    async fn update_outcome(&self, email: &Email) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_for_tenant(&self, tenant_id: &TenantId)
        -> Result<Vec<AutomationRule>, RepositoryError>;
    async fn find_by_id(&self, id: &RuleId) -> Result<Option<AutomationRule>, RepositoryError>;
    async fn save(&self, rule: AutomationRule) -> Result<(), RepositoryError>;
    async fn record_trigger(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<ApprovalItem>, RepositoryError>;
    async fn save(&self, item: ApprovalItem) -> Result<(), RepositoryError>;
    /// Moves the item to `next` only while it is still pending. `false` means
    /// another reviewer decided it first.
    async fn claim_pending(
        &self,
        id: &ApprovalId,
        next: ApprovalStatus,
    ) -> Result<bool, RepositoryError>;
    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ApprovalItem>, RepositoryError>;
}

#[async_trait]
pub trait EscalationRepository: Send + Sync {
    async fn find_by_id(&self, id: &EscalationId)
        -> Result<Option<EscalationItem>, RepositoryError>;
    async fn save(&self, item: EscalationItem) -> Result<(), RepositoryError>;
    /// Pending and in-progress escalations, newest first.
    async fn list_open(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<EscalationItem>, RepositoryError>;
    async fn list_for_email(&self, email_id: &EmailId)
        -> Result<Vec<EscalationItem>, RepositoryError>;
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, entries: &[ActivityLogEntry]) -> Result<(), RepositoryError>;
    async fn list_for_email(&self, email_id: &EmailId)
        -> Result<Vec<ActivityLogEntry>, RepositoryError>;
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ActivityLogEntry>, RepositoryError>;
}

#[async_trait]
pub trait TenantSettingsRepository: Send + Sync {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<TenantSettings>, RepositoryError>;
    async fn save(&self, settings: TenantSettings) -> Result<(), RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, &value)).transpose()
}

pub(crate) fn parse_enum<T>(
    column: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(value).ok_or_else(|| RepositoryError::Decode(format!("{column}: unknown value `{value}`")))
}

pub(crate) fn percent(column: &str, value: i64) -> Result<u8, RepositoryError> {
    u8::try_from(value)
        .ok()
        .filter(|value| *value <= 100)
        .ok_or_else(|| RepositoryError::Decode(format!("{column}: {value} is not a percentage")))
}
