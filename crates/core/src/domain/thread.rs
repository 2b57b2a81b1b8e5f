use serde::{Deserialize, Serialize};

use crate::domain::email::{Email, ThreadId};

/// Where an email landed within its conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPlacement {
    pub thread_id: ThreadId,
    pub position: u32,
    pub is_thread_start: bool,
}

/// Conversation view assembled from emails sharing a thread id. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadContext {
    pub thread_id: ThreadId,
    pub emails: Vec<Email>,
    pub customer_address: String,
    pub business_address: String,
    pub summary: String,
}

impl ThreadContext {
    pub fn is_multi_turn(&self) -> bool {
        self.emails.len() > 1
    }
}
