use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use replyguard_core::audit::ActivityLogEntry;
use replyguard_core::domain::approval::{ApprovalId, ApprovalItem, ApprovalStatus};
use replyguard_core::domain::email::{Email, EmailId, MessageId, ThreadId};
use replyguard_core::domain::escalation::{EscalationId, EscalationItem, EscalationStatus};
use replyguard_core::domain::rule::{AutomationRule, RuleId};
use replyguard_core::domain::tenant::{TenantId, TenantSettings};
use replyguard_core::domain::thread::ThreadPlacement;

use super::{
    ActivityLogRepository, ApprovalRepository, EmailRepository, EscalationRepository,
    RepositoryError, RuleRepository, TenantSettingsRepository,
};

fn take(limit: u32) -> usize {
    usize::try_from(limit).unwrap_or(usize::MAX)
}

#[derive(Default)]
pub struct InMemoryEmailRepository {
    emails: RwLock<HashMap<String, Email>>,
}

impl InMemoryEmailRepository {
    pub async fn all(&self) -> Vec<Email> {
        let emails = self.emails.read().await;
        let mut all: Vec<Email> = emails.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        all
    }
}

#[async_trait::async_trait]
impl EmailRepository for InMemoryEmailRepository {
    async fn insert(&self, email: Email) -> Result<(), RepositoryError> {
        let mut emails = self.emails.write().await;
        let duplicate = emails.values().any(|existing| {
            existing.tenant_id == email.tenant_id && existing.message_id == email.message_id
        });
        if duplicate {
            return Err(RepositoryError::Duplicate(format!(
                "email {} for tenant {}",
                email.message_id.0, email.tenant_id.0
            )));
        }
        emails.insert(email.id.0.clone(), email);
        Ok(())
    }

    async fn find_by_id(&self, id: &EmailId) -> Result<Option<Email>, RepositoryError> {
        let emails = self.emails.read().await;
        Ok(emails.get(&id.0).cloned())
    }

    async fn find_by_message_id(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
    ) -> Result<Option<Email>, RepositoryError> {
        let emails = self.emails.read().await;
        Ok(emails
            .values()
            .find(|email| &email.tenant_id == tenant_id && &email.message_id == message_id)
            .cloned())
    }

    async fn list_between(
        &self,
        tenant_id: &TenantId,
        first: &str,
        second: &str,
        limit: u32,
    ) -> Result<Vec<Email>, RepositoryError> {
        let emails = self.emails.read().await;
        let mut matching: Vec<Email> = emails
            .values()
            .filter(|email| &email.tenant_id == tenant_id && email.is_between(first, second))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(take(limit));
        Ok(matching)
    }

    async fn list_thread(
        &self,
        tenant_id: &TenantId,
        thread_id: &ThreadId,
    ) -> Result<Vec<Email>, RepositoryError> {
        let emails = self.emails.read().await;
        let mut thread: Vec<Email> = emails
            .values()
            .filter(|email| {
                &email.tenant_id == tenant_id && email.thread_id.as_ref() == Some(thread_id)
            })
            .cloned()
            .collect();
        thread.sort_by(|a, b| {
            a.thread_position.cmp(&b.thread_position).then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(thread)
    }

    async fn update_thread(
        &self,
        id: &EmailId,
        placement: &ThreadPlacement,
    ) -> Result<(), RepositoryError> {
        let mut emails = self.emails.write().await;
        let email = emails
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("email {}", id.0)))?;
        email.thread_id = Some(placement.thread_id.clone());
        email.thread_position = Some(placement.position);
        email.is_thread_start = placement.is_thread_start;
        Ok(())
    }

    async fn update_outcome(&self, email: &Email) -> Result<(), RepositoryError> {
        let mut emails = self.emails.write().await;
        let stored = emails
            .get_mut(&email.id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("email {}", email.id.0)))?;
        stored.status = email.status;
        stored.classification = email.classification;
        stored.confidence = email.confidence;
        stored.escalation_reason = email.escalation_reason.clone();
        stored.processed_at = email.processed_at;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<HashMap<String, AutomationRule>>,
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AutomationRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut scoped: Vec<AutomationRule> =
            rules.values().filter(|rule| &rule.tenant_id == tenant_id).cloned().collect();
        scoped.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(scoped)
    }

    async fn find_by_id(&self, id: &RuleId) -> Result<Option<AutomationRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&id.0).cloned())
    }

    async fn save(&self, rule: AutomationRule) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        let trigger_state =
            rules.get(&rule.id.0).map(|existing| (existing.trigger_count, existing.last_triggered_at));
        let mut rule = rule;
        if let Some((trigger_count, last_triggered_at)) = trigger_state {
            rule.trigger_count = trigger_count;
            rule.last_triggered_at = last_triggered_at;
        }
        rules.insert(rule.id.0.clone(), rule);
        Ok(())
    }

    async fn record_trigger(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("automation rule {}", id.0)))?;
        rule.trigger_count = rule.trigger_count.saturating_add(1);
        rule.last_triggered_at = Some(at);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryApprovalRepository {
    approvals: RwLock<HashMap<String, ApprovalItem>>,
}

#[async_trait::async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<ApprovalItem>, RepositoryError> {
        let approvals = self.approvals.read().await;
        Ok(approvals.get(&id.0).cloned())
    }

    async fn save(&self, item: ApprovalItem) -> Result<(), RepositoryError> {
        let mut approvals = self.approvals.write().await;
        approvals.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn claim_pending(
        &self,
        id: &ApprovalId,
        next: ApprovalStatus,
    ) -> Result<bool, RepositoryError> {
        let mut approvals = self.approvals.write().await;
        match approvals.get_mut(&id.0) {
            Some(item) if item.status == ApprovalStatus::Pending => {
                item.status = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ApprovalItem>, RepositoryError> {
        let approvals = self.approvals.read().await;
        let mut pending: Vec<ApprovalItem> = approvals
            .values()
            .filter(|item| &item.tenant_id == tenant_id && item.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending.truncate(take(limit));
        Ok(pending)
    }
}

#[derive(Default)]
pub struct InMemoryEscalationRepository {
    escalations: RwLock<HashMap<String, EscalationItem>>,
}

#[async_trait::async_trait]
impl EscalationRepository for InMemoryEscalationRepository {
    async fn find_by_id(
        &self,
        id: &EscalationId,
    ) -> Result<Option<EscalationItem>, RepositoryError> {
        let escalations = self.escalations.read().await;
        Ok(escalations.get(&id.0).cloned())
    }

    async fn save(&self, item: EscalationItem) -> Result<(), RepositoryError> {
        let mut escalations = self.escalations.write().await;
        escalations.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn list_open(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<EscalationItem>, RepositoryError> {
        let escalations = self.escalations.read().await;
        let mut open: Vec<EscalationItem> = escalations
            .values()
            .filter(|item| {
                &item.tenant_id == tenant_id && item.status != EscalationStatus::Resolved
            })
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open.truncate(take(limit));
        Ok(open)
    }

    async fn list_for_email(
        &self,
        email_id: &EmailId,
    ) -> Result<Vec<EscalationItem>, RepositoryError> {
        let escalations = self.escalations.read().await;
        let mut matching: Vec<EscalationItem> =
            escalations.values().filter(|item| &item.email_id == email_id).cloned().collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct InMemoryActivityLogRepository {
    entries: RwLock<Vec<ActivityLogEntry>>,
}

#[async_trait::async_trait]
impl ActivityLogRepository for InMemoryActivityLogRepository {
    async fn append(&self, entries: &[ActivityLogEntry]) -> Result<(), RepositoryError> {
        let mut stored = self.entries.write().await;
        stored.extend_from_slice(entries);
        Ok(())
    }

    async fn list_for_email(
        &self,
        email_id: &EmailId,
    ) -> Result<Vec<ActivityLogEntry>, RepositoryError> {
        let stored = self.entries.read().await;
        Ok(stored.iter().filter(|entry| entry.email_id.as_ref() == Some(email_id)).cloned().collect())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ActivityLogEntry>, RepositoryError> {
        let stored = self.entries.read().await;
        Ok(stored
            .iter()
            .rev()
            .filter(|entry| &entry.tenant_id == tenant_id)
            .take(take(limit))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryTenantSettingsRepository {
    settings: RwLock<HashMap<String, TenantSettings>>,
}

#[async_trait::async_trait]
impl TenantSettingsRepository for InMemoryTenantSettingsRepository {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<TenantSettings>, RepositoryError> {
        let settings = self.settings.read().await;
        Ok(settings.get(&tenant_id.0).cloned())
    }

    async fn save(&self, settings: TenantSettings) -> Result<(), RepositoryError> {
        let mut stored = self.settings.write().await;
        stored.insert(settings.tenant_id.0.clone(), settings);
        Ok(())
    }
}
