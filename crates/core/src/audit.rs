use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::email::{EmailId, ThreadId};
use crate::domain::tenant::TenantId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    Ingress,
    Classification,
    Routing,
    Safety,
    Dispatch,
    Review,
    System,
}

impl ActivityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Classification => "classification",
            Self::Routing => "routing",
            Self::Safety => "safety",
            Self::Dispatch => "dispatch",
            Self::Review => "review",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ingress" => Some(Self::Ingress),
            "classification" => Some(Self::Classification),
            "routing" => Some(Self::Routing),
            "safety" => Some(Self::Safety),
            "dispatch" => Some(Self::Dispatch),
            "review" => Some(Self::Review),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOutcome {
    Success,
    Rejected,
    Failed,
}

impl ActivityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Identifies the email a run of activity entries belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityContext {
    pub tenant_id: TenantId,
    pub email_id: Option<EmailId>,
    pub thread_id: Option<ThreadId>,
    pub actor: String,
}

impl ActivityContext {
    pub fn new(tenant_id: TenantId, email_id: Option<EmailId>, actor: impl Into<String>) -> Self {
        Self { tenant_id, email_id, thread_id: None, actor: actor.into() }
    }

    pub fn with_thread(mut self, thread_id: Option<ThreadId>) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn entry(
        &self,
        action: impl Into<String>,
        category: ActivityCategory,
        outcome: ActivityOutcome,
    ) -> ActivityLogEntry {
        let mut entry = ActivityLogEntry::new(
            self.tenant_id.clone(),
            self.email_id.clone(),
            action,
            category,
            self.actor.clone(),
            outcome,
        );
        entry.thread_id = self.thread_id.clone();
        entry
    }
}

/// Append-only record of one engine action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: String,
    pub tenant_id: TenantId,
    pub email_id: Option<EmailId>,
    pub thread_id: Option<ThreadId>,
    pub action: String,
    pub category: ActivityCategory,
    pub actor: String,
    pub outcome: ActivityOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        tenant_id: TenantId,
        email_id: Option<EmailId>,
        action: impl Into<String>,
        category: ActivityCategory,
        actor: impl Into<String>,
        outcome: ActivityOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            email_id,
            thread_id: None,
            action: action.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait ActivitySink: Send + Sync {
    fn emit(&self, entry: ActivityLogEntry);
}

#[derive(Clone, Default)]
pub struct InMemoryActivitySink {
    entries: Arc<Mutex<Vec<ActivityLogEntry>>>,
}

impl InMemoryActivitySink {
    pub fn entries(&self) -> Vec<ActivityLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<ActivityLogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl ActivitySink for InMemoryActivitySink {
    fn emit(&self, entry: ActivityLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
