//! Human review: approval decisions and the escalation lifecycle.
//!
//! A decision first claims the item, so two reviewers can never both release
//! it. Anything released goes through the safety guard again before it is
//! dispatched, and the item's workflow runs only after the claim. When the
//! workflow or the send fails the item goes back to pending; a workflow that
//! already ran is dropped from it so a retry only resends its result.

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use replyguard_core::audit::{ActivityCategory, ActivityContext, ActivityLogEntry, ActivityOutcome};
use replyguard_core::domain::approval::{ApprovalId, ApprovalItem};
use replyguard_core::domain::email::{Email, EmailStatus};
use replyguard_core::domain::escalation::{EscalationId, EscalationItem};
use replyguard_core::domain::intent::Priority;
use replyguard_core::domain::tenant::{TenantId, TenantSettings};
use replyguard_core::errors::DomainError;
use replyguard_db::repositories::RepositoryError;

use crate::guardrails::{GuardDecision, SafetyGuard};
use crate::responses::HandlerError;
use crate::runtime::{DecisionRuntime, SendError};

const REJECTED_WITHOUT_FEEDBACK: &str = "reply rejected by reviewer";

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("approval {0} was already decided by another reviewer")]
    AlreadyDecided(String),
    #[error(transparent)]
    Workflow(#[from] HandlerError),
    #[error("reply blocked by safety guard ({rules})")]
    Blocked { rules: String },
    #[error(transparent)]
    DispatchFailed(#[from] SendError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub approval: ApprovalItem,
    pub escalation: EscalationItem,
}

impl DecisionRuntime {
    pub async fn list_pending_approvals(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ApprovalItem>, DeskError> {
        Ok(self.repos.approvals.list_pending(tenant_id, limit).await?)
    }

    pub async fn list_open_escalations(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<EscalationItem>, DeskError> {
        Ok(self.repos.escalations.list_open(tenant_id, limit).await?)
    }

    /// Runs the item's workflow and sends its result. Without a workflow the
    /// proposal goes out as written.
    pub async fn approve(&self, id: &ApprovalId, reviewer: &str) -> Result<ApprovalItem, DeskError> {
        let now = Utc::now();
        let mut pending = self.approval(id).await?;
        let mut email = self.email_for(&pending).await?;
        let settings = self.tenant_settings(&email.tenant_id).await;

        let mut item = pending.clone();
        item.approve(reviewer, now)?;
        self.claim(&item).await?;

        let released = self.release_approved(&mut pending, &email, &settings, &item).await;
        item.final_response = Some(match released {
            Ok(sent) => sent,
            Err(error) => return Err(self.unclaim(pending, error).await),
        });

        self.finish_release(&item, &mut email, reviewer, "approval.approved").await?;
        Ok(item)
    }

    /// Sends the reviewer's text in place of the proposal.
    pub async fn edit_and_send(
        &self,
        id: &ApprovalId,
        reviewer: &str,
        edited_response: &str,
    ) -> Result<ApprovalItem, DeskError> {
        let edited = edited_response.trim();
        if edited.is_empty() {
            return Err(DeskError::InvalidInput("edited response must not be empty".to_string()));
        }

        let now = Utc::now();
        let mut pending = self.approval(id).await?;
        let mut email = self.email_for(&pending).await?;
        let settings = self.tenant_settings(&email.tenant_id).await;

        let mut item = pending.clone();
        item.edit_and_send(reviewer, edited, now)?;
        let body = self.guard(&email, &settings, &item, edited)?;
        self.claim(&item).await?;

        let released = self.release_edited(&mut pending, &email, &settings, body).await;
        item.final_response = Some(match released {
            Ok(sent) => sent,
            Err(error) => return Err(self.unclaim(pending, error).await),
        });

        self.finish_release(&item, &mut email, reviewer, "approval.edited_and_sent").await?;
        Ok(item)
    }

    /// Nothing is sent. The email is handed to a human with the feedback as the reason.
    pub async fn reject(
        &self,
        id: &ApprovalId,
        reviewer: &str,
        feedback: Option<String>,
    ) -> Result<Rejection, DeskError> {
        let now = Utc::now();
        let feedback = feedback.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        let mut item = self.approval(id).await?;
        let mut email = self.email_for(&item).await?;

        let pending = item.clone();
        item.reject(reviewer, feedback.clone(), now)?;
        self.claim(&item).await?;
        let reason = feedback.unwrap_or_else(|| REJECTED_WITHOUT_FEEDBACK.to_string());
        let escalation = EscalationItem::pending(
            item.tenant_id.clone(),
            item.email_id.clone(),
            Some(item.classification),
            Priority::Medium,
            reason.clone(),
            now,
        );

        if let Err(failure) = self.repos.escalations.save(escalation.clone()).await {
            return Err(self.unclaim(pending, failure.into()).await);
        }
        self.repos.approvals.save(item.clone()).await?;
        email.status = EmailStatus::Escalated;
        email.escalation_reason = Some(reason.clone());
        email.processed_at = Some(now);
        self.repos.emails.update_outcome(&email).await?;

        info!(
            event_name = "desk.approval.rejected",
            tenant_id = %item.tenant_id,
            email_id = %item.email_id.0,
            approval_id = %item.id.0,
            escalation_id = %escalation.id.0,
            "approval rejected and escalated"
        );
        self.record(
            review_context(&email, reviewer)
                .entry("approval.rejected", ActivityCategory::Review, ActivityOutcome::Success)
                .with_metadata("approval_id", item.id.0.clone())
                .with_metadata("escalation_id", escalation.id.0.clone())
                .with_metadata("reason", reason),
        )
        .await;

        Ok(Rejection { approval: item, escalation })
    }

    pub async fn start_escalation(
        &self,
        id: &EscalationId,
        assignee: &str,
    ) -> Result<EscalationItem, DeskError> {
        if assignee.trim().is_empty() {
            return Err(DeskError::InvalidInput("assignee must not be empty".to_string()));
        }
        let mut item = self.escalation(id).await?;
        item.start(assignee.trim(), Utc::now())?;
        self.repos.escalations.save(item.clone()).await?;

        info!(
            event_name = "desk.escalation.started",
            tenant_id = %item.tenant_id,
            email_id = %item.email_id.0,
            escalation_id = %item.id.0,
            "escalation picked up"
        );
        self.record_escalation(&item, assignee, "escalation.started").await;
        Ok(item)
    }

    pub async fn resolve_escalation(
        &self,
        id: &EscalationId,
        actor: &str,
        note: Option<String>,
    ) -> Result<EscalationItem, DeskError> {
        let mut item = self.escalation(id).await?;
        let note = note.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
        item.resolve(note, Utc::now())?;
        self.repos.escalations.save(item.clone()).await?;

        info!(
            event_name = "desk.escalation.resolved",
            tenant_id = %item.tenant_id,
            email_id = %item.email_id.0,
            escalation_id = %item.id.0,
            "escalation resolved"
        );
        self.record_escalation(&item, actor, "escalation.resolved").await;
        Ok(item)
    }

    async fn approval(&self, id: &ApprovalId) -> Result<ApprovalItem, DeskError> {
        self.repos
            .approvals
            .find_by_id(id)
            .await?
            .ok_or_else(|| DeskError::NotFound { kind: "approval", id: id.0.clone() })
    }

    async fn escalation(&self, id: &EscalationId) -> Result<EscalationItem, DeskError> {
        self.repos
            .escalations
            .find_by_id(id)
            .await?
            .ok_or_else(|| DeskError::NotFound { kind: "escalation", id: id.0.clone() })
    }

    async fn email_for(&self, item: &ApprovalItem) -> Result<Email, DeskError> {
        self.repos
            .emails
            .find_by_id(&item.email_id)
            .await?
            .ok_or_else(|| DeskError::NotFound { kind: "email", id: item.email_id.0.clone() })
    }

    /// `Err(AlreadyDecided)` when another decision claimed the item first.
    async fn claim(&self, item: &ApprovalItem) -> Result<(), DeskError> {
        if self.repos.approvals.claim_pending(&item.id, item.status).await? {
            return Ok(());
        }
        warn!(
            event_name = "desk.approval.claim_lost",
            tenant_id = %item.tenant_id,
            approval_id = %item.id.0,
            status = item.status.as_str(),
            "approval already decided"
        );
        Err(DeskError::AlreadyDecided(item.id.0.clone()))
    }

    /// Stores `pending` back over a claimed item and hands `cause` back to the caller.
    async fn unclaim(&self, pending: ApprovalItem, cause: DeskError) -> DeskError {
        if let Err(failure) = self.repos.approvals.save(pending.clone()).await {
            error!(
                event_name = "desk.approval.unclaim_failed",
                tenant_id = %pending.tenant_id,
                approval_id = %pending.id.0,
                error = %failure,
                "claimed approval could not be returned to the queue"
            );
        }
        cause
    }

    /// Runs the pending item's workflow, if it has one, and returns the reply
    /// reporting its result. On success the workflow is dropped from `pending`
    /// and the result becomes its proposal.
    async fn run_workflow(
        &self,
        pending: &mut ApprovalItem,
        email: &Email,
        settings: &TenantSettings,
    ) -> Result<Option<String>, DeskError> {
        let Some(action) = pending.action.clone() else {
            return Ok(None);
        };
        let result = self.responses.execute(email, settings, &action).await.map_err(|failure| {
            warn!(
                event_name = "desk.workflow.failed",
                tenant_id = %email.tenant_id,
                email_id = %email.id.0,
                approval_id = %pending.id.0,
                error = %failure,
                "released workflow failed"
            );
            failure
        })?;

        info!(
            event_name = "desk.workflow.completed",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            approval_id = %pending.id.0,
            "released workflow ran"
        );
        pending.action = None;
        pending.proposed_response = result.clone();
        Ok(Some(result))
    }

    /// The body that may be sent for `text`, after correction.
    fn guard(
        &self,
        email: &Email,
        settings: &TenantSettings,
        item: &ApprovalItem,
        text: &str,
    ) -> Result<String, DeskError> {
        let verdict = SafetyGuard::for_tenant(settings).validate(text, &email.body, item.classification);

        match verdict.decision(text) {
            GuardDecision::Send { body, corrected } => {
                if corrected {
                    warn!(
                        event_name = "desk.safety.corrected",
                        tenant_id = %email.tenant_id,
                        email_id = %email.id.0,
                        rules = %verdict.rule_ids(),
                        "reviewed reply replaced by corrected response"
                    );
                }
                Ok(body)
            }
            GuardDecision::Block => {
                warn!(
                    event_name = "desk.safety.blocked",
                    tenant_id = %email.tenant_id,
                    email_id = %email.id.0,
                    rules = %verdict.rule_ids(),
                    "reviewed reply blocked"
                );
                Err(DeskError::Blocked { rules: verdict.rule_ids() })
            }
        }
    }

    /// Returns the text that actually went out.
    async fn release_approved(
        &self,
        pending: &mut ApprovalItem,
        email: &Email,
        settings: &TenantSettings,
        item: &ApprovalItem,
    ) -> Result<String, DeskError> {
        let text = match self.run_workflow(pending, email, settings).await? {
            Some(result) => result,
            None => pending.proposed_response.clone(),
        };
        let body = self.guard(email, settings, item, &text)?;
        self.send_reply(email, settings, &body).await?;
        Ok(body)
    }

    /// `body` was guarded before the claim; the workflow result is not sent.
    async fn release_edited(
        &self,
        pending: &mut ApprovalItem,
        email: &Email,
        settings: &TenantSettings,
        body: String,
    ) -> Result<String, DeskError> {
        self.run_workflow(pending, email, settings).await?;
        self.send_reply(email, settings, &body).await?;
        Ok(body)
    }

    async fn finish_release(
        &self,
        item: &ApprovalItem,
        email: &mut Email,
        reviewer: &str,
        action: &'static str,
    ) -> Result<(), DeskError> {
        let now = item.decided_at.unwrap_or_else(Utc::now);
        self.repos.approvals.save(item.clone()).await?;

        email.status = EmailStatus::Resolved;
        email.escalation_reason = None;
        email.processed_at = Some(now);
        self.repos.emails.update_outcome(email).await?;

        if let Err(error) = self.repos.rules.record_trigger(&item.rule_id, now).await {
            warn!(
                event_name = "desk.rule.trigger_not_recorded",
                tenant_id = %item.tenant_id,
                rule_id = %item.rule_id.0,
                error = %error,
                "rule trigger count not updated"
            );
        }

        info!(
            event_name = "desk.approval.released",
            tenant_id = %item.tenant_id,
            email_id = %item.email_id.0,
            approval_id = %item.id.0,
            status = item.status.as_str(),
            "reviewed reply sent"
        );
        self.record(
            review_context(email, reviewer)
                .entry(action, ActivityCategory::Review, ActivityOutcome::Success)
                .with_metadata("approval_id", item.id.0.clone()),
        )
        .await;
        Ok(())
    }

    async fn record_escalation(&self, item: &EscalationItem, actor: &str, action: &'static str) {
        let context = ActivityContext::new(item.tenant_id.clone(), Some(item.email_id.clone()), actor);
        self.record(
            context
                .entry(action, ActivityCategory::Review, ActivityOutcome::Success)
                .with_metadata("escalation_id", item.id.0.clone())
                .with_metadata("status", item.status.as_str()),
        )
        .await;
    }

    async fn record(&self, entry: ActivityLogEntry) {
        if let Err(error) = self.repos.activity.append(&[entry]).await {
            warn!(event_name = "desk.activity.write_failed", error = %error, "review activity dropped");
        }
    }
}

fn review_context(email: &Email, reviewer: &str) -> ActivityContext {
    ActivityContext::new(email.tenant_id.clone(), Some(email.id.clone()), reviewer)
        .with_thread(email.thread_id.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use replyguard_core::domain::approval::{ApprovalAction, ApprovalId, ApprovalItem, ApprovalStatus};
    use replyguard_core::domain::email::EmailStatus;
    use replyguard_core::domain::escalation::EscalationStatus;
    use replyguard_core::domain::intent::Intent;
    use replyguard_core::domain::rule::AutomationRule;
    use replyguard_core::domain::tenant::TenantId;
    use replyguard_core::errors::DomainError;
    use replyguard_db::repositories::{ApprovalRepository, InMemoryApprovalRepository, RepositoryError};

    use super::DeskError;
    use crate::runtime::{ProcessOutcome, Repositories};
    use crate::testing::{
        inbound, tenant, verdict, CountingSubscriptions, Harness, HarnessBuilder, RecordingDispatcher,
        ScriptedSubscriptions,
    };

    async fn pending_plan_change(builder: HarnessBuilder) -> (Harness, ApprovalId) {
        let harness = builder.llm(verdict(Intent::SubscriptionChanges, 90)).build();
        harness
            .repos
            .rules
            .save(
                AutomationRule::builder(tenant(), Intent::SubscriptionChanges)
                    .requires_approval(true)
                    .build(),
            )
            .await
            .expect("save rule");

        let report = harness
            .runtime
            .process(tenant(), inbound("m-plan", "Plan", "Switch me to the annual plan"))
            .await
            .expect("processed");
        let ProcessOutcome::AwaitingApproval { approval_id, .. } = report.outcome else {
            panic!("expected approval item, got {:?}", report.outcome);
        };
        (harness, approval_id)
    }

    /// Keeps handing out the first copy it read, as a second reviewer's
    /// browser would after the first one already decided.
    struct StaleReads {
        inner: InMemoryApprovalRepository,
        first_read: Mutex<Option<ApprovalItem>>,
    }

    #[async_trait]
    impl ApprovalRepository for StaleReads {
        async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<ApprovalItem>, RepositoryError> {
            if let Some(item) = self.first_read.lock().expect("lock").clone() {
                return Ok(Some(item));
            }
            let item = self.inner.find_by_id(id).await?;
            *self.first_read.lock().expect("lock") = item.clone();
            Ok(item)
        }

        async fn save(&self, item: ApprovalItem) -> Result<(), RepositoryError> {
            self.inner.save(item).await
        }

        async fn claim_pending(&self, id: &ApprovalId, next: ApprovalStatus) -> Result<bool, RepositoryError> {
            self.inner.claim_pending(id, next).await
        }

        async fn list_pending(&self, tenant_id: &TenantId, limit: u32) -> Result<Vec<ApprovalItem>, RepositoryError> {
            self.inner.list_pending(tenant_id, limit).await
        }
    }

    async fn pending_approval(builder: HarnessBuilder) -> (Harness, ApprovalId) {
        let harness = builder.llm(verdict(Intent::OrderStatus, 88)).build();
        harness
            .repos
            .rules
            .save(AutomationRule::builder(tenant(), Intent::OrderStatus).requires_approval(true).build())
            .await
            .expect("save rule");

        let report = harness
            .runtime
            .process(tenant(), inbound("m-desk", "Order #4821", "Where is my parcel?"))
            .await
            .expect("processed");
        let ProcessOutcome::AwaitingApproval { approval_id, .. } = report.outcome else {
            panic!("expected approval item");
        };
        (harness, approval_id)
    }

    #[tokio::test]
    async fn approving_sends_and_resolves() {
        let (harness, id) = pending_approval(HarnessBuilder::new()).await;

        let pending = harness.runtime.list_pending_approvals(&tenant(), 10).await.expect("list");
        assert_eq!(pending.len(), 1);

        let item = harness.runtime.approve(&id, "reviewer@shop.io").await.expect("approve");
        assert_eq!(item.status, ApprovalStatus::Approved);
        assert_eq!(item.final_response.as_deref(), Some(item.proposed_response.as_str()));

        let sent = harness.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, item.proposed_response);

        let email = harness.repos.emails.find_by_id(&item.email_id).await.expect("lookup").expect("email");
        assert_eq!(email.status, EmailStatus::Resolved);
        let rule = harness.repos.rules.find_by_id(&item.rule_id).await.expect("lookup").expect("rule");
        assert_eq!(rule.trigger_count, 1);
        assert!(harness.runtime.list_pending_approvals(&tenant(), 10).await.expect("list").is_empty());

        let again = harness.runtime.approve(&id, "reviewer@shop.io").await;
        assert!(matches!(again, Err(DeskError::Domain(DomainError::InvalidApprovalTransition { .. }))));
        assert_eq!(harness.dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_leaves_item_pending() {
        let (harness, id) =
            pending_approval(HarnessBuilder::new().dispatcher(RecordingDispatcher::refusing())).await;

        let result = harness.runtime.approve(&id, "reviewer@shop.io").await;
        assert!(matches!(result, Err(DeskError::DispatchFailed(_))));

        let item = harness.repos.approvals.find_by_id(&id).await.expect("lookup").expect("item");
        assert_eq!(item.status, ApprovalStatus::Pending);
        let email = harness.repos.emails.find_by_id(&item.email_id).await.expect("lookup").expect("email");
        assert_eq!(email.status, EmailStatus::AwaitingApproval);
    }

    #[tokio::test]
    async fn edited_reply_is_guarded_before_sending() {
        let (harness, id) = pending_approval(HarnessBuilder::new()).await;

        let blocked = harness
            .runtime
            .edit_and_send(&id, "reviewer@shop.io", "Sorry! Use code SAVE20 for 20% off next time.")
            .await;
        assert!(matches!(blocked, Err(DeskError::Blocked { .. })));
        assert!(harness.dispatcher.sent().is_empty());

        let empty = harness.runtime.edit_and_send(&id, "reviewer@shop.io", "   ").await;
        assert!(matches!(empty, Err(DeskError::InvalidInput(_))));

        let item = harness
            .runtime
            .edit_and_send(&id, "reviewer@shop.io", "Your parcel arrives Friday.")
            .await
            .expect("edit and send");
        assert_eq!(item.status, ApprovalStatus::EditedAndSent);
        assert_eq!(item.final_response.as_deref(), Some("Your parcel arrives Friday."));
        assert_eq!(harness.dispatcher.sent()[0].text, "Your parcel arrives Friday.");
    }

    #[tokio::test]
    async fn rejection_escalates_with_feedback() {
        let (harness, id) = pending_approval(HarnessBuilder::new()).await;

        let rejection = harness
            .runtime
            .reject(&id, "reviewer@shop.io", Some("tracking number is wrong".to_string()))
            .await
            .expect("reject");

        assert_eq!(rejection.approval.status, ApprovalStatus::Rejected);
        assert_eq!(rejection.escalation.reason, "tracking number is wrong");
        assert_eq!(rejection.escalation.classification, Some(Intent::OrderStatus));
        assert!(harness.dispatcher.sent().is_empty());

        let email = harness
            .repos
            .emails
            .find_by_id(&rejection.approval.email_id)
            .await
            .expect("lookup")
            .expect("email");
        assert_eq!(email.status, EmailStatus::Escalated);
        assert_eq!(email.escalation_reason.as_deref(), Some("tracking number is wrong"));

        let open = harness.runtime.list_open_escalations(&tenant(), 10).await.expect("list");
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn escalation_lifecycle_only_moves_forward() {
        let (harness, id) = pending_approval(HarnessBuilder::new()).await;
        let rejection = harness.runtime.reject(&id, "reviewer@shop.io", None).await.expect("reject");
        assert_eq!(rejection.escalation.reason, "reply rejected by reviewer");
        let escalation_id = rejection.escalation.id;

        let started = harness.runtime.start_escalation(&escalation_id, "agent@shop.io").await.expect("start");
        assert_eq!(started.status, EscalationStatus::InProgress);
        assert_eq!(started.assignee.as_deref(), Some("agent@shop.io"));

        let resolved = harness
            .runtime
            .resolve_escalation(&escalation_id, "agent@shop.io", Some("called the customer".to_string()))
            .await
            .expect("resolve");
        assert_eq!(resolved.status, EscalationStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
        assert!(harness.runtime.list_open_escalations(&tenant(), 10).await.expect("list").is_empty());

        let restart = harness.runtime.start_escalation(&escalation_id, "agent@shop.io").await;
        assert!(matches!(
            restart,
            Err(DeskError::Domain(DomainError::InvalidEscalationTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn workflow_runs_only_when_released() {
        let subscriptions = CountingSubscriptions::default();
        let (harness, id) = pending_plan_change(HarnessBuilder::new().subscriptions(subscriptions.clone())).await;
        assert_eq!(subscriptions.calls(), 0);

        let item = harness.runtime.approve(&id, "reviewer@shop.io").await.expect("approve");

        assert_eq!(subscriptions.calls(), 1);
        assert_eq!(item.status, ApprovalStatus::Approved);
        let sent = harness.dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Your plan now renews annually."));
        assert_eq!(item.final_response.as_deref(), Some(sent[0].text.as_str()));
    }

    #[tokio::test]
    async fn rejecting_a_workflow_never_runs_it() {
        let subscriptions = CountingSubscriptions::default();
        let (harness, id) = pending_plan_change(HarnessBuilder::new().subscriptions(subscriptions.clone())).await;

        harness.runtime.reject(&id, "reviewer@shop.io", None).await.expect("reject");

        assert_eq!(subscriptions.calls(), 0);
        assert!(harness.dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn edited_reply_still_runs_the_workflow() {
        let subscriptions = CountingSubscriptions::default();
        let (harness, id) = pending_plan_change(HarnessBuilder::new().subscriptions(subscriptions.clone())).await;

        let item = harness
            .runtime
            .edit_and_send(&id, "reviewer@shop.io", "You're now on the annual plan. Enjoy!")
            .await
            .expect("edit and send");

        assert_eq!(subscriptions.calls(), 1);
        assert_eq!(item.status, ApprovalStatus::EditedAndSent);
        assert_eq!(harness.dispatcher.sent()[0].text, "You're now on the annual plan. Enjoy!");
    }

    #[tokio::test]
    async fn failed_workflow_leaves_item_pending() {
        let (harness, id) =
            pending_plan_change(HarnessBuilder::new().subscriptions(ScriptedSubscriptions(""))).await;

        let result = harness.runtime.approve(&id, "reviewer@shop.io").await;
        assert!(matches!(result, Err(DeskError::Workflow(_))), "{result:?}");
        assert!(harness.dispatcher.sent().is_empty());

        let item = harness.repos.approvals.find_by_id(&id).await.expect("lookup").expect("item");
        assert_eq!(item.status, ApprovalStatus::Pending);
        assert_eq!(item.action, Some(ApprovalAction::ChangeSubscription));
    }

    #[tokio::test]
    async fn send_failure_after_workflow_does_not_repeat_it() {
        let subscriptions = CountingSubscriptions::default();
        let (harness, id) = pending_plan_change(
            HarnessBuilder::new()
                .subscriptions(subscriptions.clone())
                .dispatcher(RecordingDispatcher::refusing()),
        )
        .await;

        let first = harness.runtime.approve(&id, "reviewer@shop.io").await;
        assert!(matches!(first, Err(DeskError::DispatchFailed(_))));
        assert_eq!(subscriptions.calls(), 1);

        let item = harness.repos.approvals.find_by_id(&id).await.expect("lookup").expect("item");
        assert_eq!(item.status, ApprovalStatus::Pending);
        assert_eq!(item.action, None);
        assert!(item.proposed_response.contains("Your plan now renews annually."));

        let retry = harness.runtime.approve(&id, "reviewer@shop.io").await;
        assert!(matches!(retry, Err(DeskError::DispatchFailed(_))));
        assert_eq!(subscriptions.calls(), 1);
    }

    #[tokio::test]
    async fn second_reviewer_with_a_stale_copy_cannot_release_again() {
        let mut repos = Repositories::in_memory();
        repos.approvals = Arc::new(StaleReads {
            inner: InMemoryApprovalRepository::default(),
            first_read: Mutex::new(None),
        });
        let subscriptions = CountingSubscriptions::default();
        let (harness, id) = pending_plan_change(
            HarnessBuilder::new().subscriptions(subscriptions.clone()).repos(repos),
        )
        .await;

        harness.runtime.approve(&id, "first@shop.io").await.expect("first approval");
        let second = harness.runtime.approve(&id, "second@shop.io").await;

        assert!(matches!(second, Err(DeskError::AlreadyDecided(_))), "{second:?}");
        assert_eq!(harness.dispatcher.sent().len(), 1);
        assert_eq!(subscriptions.calls(), 1);

        let edit = harness.runtime.edit_and_send(&id, "second@shop.io", "Done, annual plan it is.").await;
        assert!(matches!(edit, Err(DeskError::AlreadyDecided(_))));
        let reject = harness.runtime.reject(&id, "second@shop.io", None).await;
        assert!(matches!(reject, Err(DeskError::AlreadyDecided(_))));
        assert_eq!(harness.dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let harness = HarnessBuilder::new().build();
        let result = harness.runtime.approve(&ApprovalId("missing".to_string()), "reviewer@shop.io").await;
        assert!(matches!(result, Err(DeskError::NotFound { kind: "approval", .. })));
    }
}
