use std::sync::Arc;

use chrono::{DateTime, Utc};

use replyguard_core::domain::email::Email;
use replyguard_core::domain::thread::{ThreadContext, ThreadPlacement};
use replyguard_core::threading::{build_context, place_in_thread};
use replyguard_db::repositories::{EmailRepository, RepositoryError};

/// How many earlier emails between the same participants are scanned for a subject match.
const PRIOR_EMAIL_SCAN: u32 = 50;

/// Assigns thread ids using prior emails between the same two addresses.
pub struct ThreadLinker {
    emails: Arc<dyn EmailRepository>,
}

impl ThreadLinker {
    pub fn new(emails: Arc<dyn EmailRepository>) -> Self {
        Self { emails }
    }

    /// Places `email` in a thread and persists the placement.
    pub async fn link(
        &self,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<ThreadPlacement, RepositoryError> {
        let prior = self
            .emails
            .list_between(&email.tenant_id, &email.from_address, &email.to_address, PRIOR_EMAIL_SCAN)
            .await?;
        let prior =
            prior.into_iter().filter(|candidate| candidate.id != email.id).collect::<Vec<_>>();

        let placement =
            place_in_thread(&email.subject, &email.from_address, &email.to_address, &prior, now);
        self.emails.update_thread(&email.id, &placement).await?;
        Ok(placement)
    }

    /// Conversation view for an email that has been linked.
    pub async fn context(
        &self,
        email: &Email,
        placement: &ThreadPlacement,
    ) -> Result<ThreadContext, RepositoryError> {
        let mut emails = self.emails.list_thread(&email.tenant_id, &placement.thread_id).await?;
        if !emails.iter().any(|candidate| candidate.id == email.id) {
            let mut current = email.clone();
            current.thread_id = Some(placement.thread_id.clone());
            current.thread_position = Some(placement.position);
            current.is_thread_start = placement.is_thread_start;
            emails.push(current);
        }
        Ok(build_context(placement.thread_id.clone(), emails, email))
    }
}
