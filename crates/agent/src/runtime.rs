//! Drives one inbound email from `Received` to a terminal state.
//!
//! Every external call made here degrades instead of failing the email: the
//! classifier and sentiment adapters return safe defaults, handler and dispatch
//! failures become escalations, and thread linking and the activity flush are
//! best-effort. Only storage errors surface to the caller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use replyguard_core::audit::{
    ActivityCategory, ActivityContext, ActivityOutcome, ActivitySink, InMemoryActivitySink,
};
use replyguard_core::domain::approval::{ApprovalId, ApprovalItem};
use replyguard_core::domain::email::{Email, EmailId, InboundEmail, ThreadId};
use replyguard_core::domain::escalation::{EscalationId, EscalationItem};
use replyguard_core::domain::intent::{ClassificationResult, Priority};
use replyguard_core::domain::rule::{AutomationRule, RuleId};
use replyguard_core::domain::tenant::{TenantId, TenantSettings};
use replyguard_core::domain::thread::ThreadContext;
use replyguard_core::flows::routing::{
    escalation_priority, route, route_with_rule, Route, RuleRoute, BLOCKED_BY_SAFETY_GUARD,
    FAILED_TO_SEND, HOLDING_REPLY_SENT, NO_MATCHING_RULE,
};
use replyguard_core::flows::{
    EmailDecisionFlow, FlowContext, FlowEngine, FlowEvent, FlowState, FlowTransitionError,
};
use replyguard_core::rules::RuleMatcher;
use replyguard_core::sentiment::{sentiment_adjusted_confidence, SentimentAnalysis};
use replyguard_core::thresholds::DecisionThresholds;
use replyguard_db::repositories::{
    ActivityLogRepository, ApprovalRepository, EmailRepository, EscalationRepository,
    InMemoryActivityLogRepository, InMemoryApprovalRepository, InMemoryEmailRepository,
    InMemoryEscalationRepository, InMemoryRuleRepository, InMemoryTenantSettingsRepository,
    RepositoryError, RuleRepository, SqlActivityLogRepository, SqlApprovalRepository,
    SqlEmailRepository, SqlEscalationRepository, SqlRuleRepository, SqlTenantSettingsRepository,
    TenantSettingsRepository,
};
use replyguard_db::DbPool;

use crate::classifier::IntentClassifier;
use crate::conversation::ThreadLinker;
use crate::guardrails::{GuardDecision, SafetyGuard, SafetyVerdict};
use crate::llm::LlmClient;
use crate::responses::{HandlerRequest, ResponseBuilder};
use crate::sentiment::{SentimentAdapter, SentimentAssessment};
use crate::templates::ReplyRenderer;
use crate::tools::{Collaborators, EmailDispatcher, OutboundEmail};

pub(crate) const ENGINE_ACTOR: &str = "engine";

#[derive(Clone)]
pub struct Repositories {
    pub emails: Arc<dyn EmailRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub escalations: Arc<dyn EscalationRepository>,
    pub activity: Arc<dyn ActivityLogRepository>,
    pub tenants: Arc<dyn TenantSettingsRepository>,
}

impl Repositories {
    pub fn sqlite(pool: DbPool) -> Self {
        Self {
            emails: Arc::new(SqlEmailRepository::new(pool.clone())),
            rules: Arc::new(SqlRuleRepository::new(pool.clone())),
            approvals: Arc::new(SqlApprovalRepository::new(pool.clone())),
            escalations: Arc::new(SqlEscalationRepository::new(pool.clone())),
            activity: Arc::new(SqlActivityLogRepository::new(pool.clone())),
            tenants: Arc::new(SqlTenantSettingsRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            emails: Arc::new(InMemoryEmailRepository::default()),
            rules: Arc::new(InMemoryRuleRepository::default()),
            approvals: Arc::new(InMemoryApprovalRepository::default()),
            escalations: Arc::new(InMemoryEscalationRepository::default()),
            activity: Arc::new(InMemoryActivityLogRepository::default()),
            tenants: Arc::new(InMemoryTenantSettingsRepository::default()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    pub thresholds: DecisionThresholds,
    pub classifier_timeout: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { thresholds: DecisionThresholds::default(), classifier_timeout: Duration::from_secs(30) }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("message {message_id} was already received for tenant {tenant_id}")]
    Duplicate { tenant_id: TenantId, message_id: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
    #[error("reply template failed to load: {0}")]
    Template(#[from] tera::Error),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("reply rendering failed: {0}")]
    Render(#[from] tera::Error),
    #[error("dispatcher refused the message")]
    Refused,
    #[error("dispatch failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Escalated { escalation_id: EscalationId, priority: Priority, reason: String },
    AwaitingApproval { approval_id: ApprovalId, confidence: u8 },
    AutoResponded { rule_id: RuleId, corrected: bool },
    /// The routing decision could not be stored. The email stays `processing`.
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub email_id: EmailId,
    pub thread_id: Option<ThreadId>,
    pub classification: ClassificationResult,
    pub sentiment: Option<SentimentAnalysis>,
    pub outcome: ProcessOutcome,
}

/// What the engine decided before anything was persisted.
enum Decision {
    Escalate { event: FlowEvent, priority: Priority, reason: String },
    Approve(ApprovalItem),
    Respond { rule_id: RuleId, corrected: bool },
}

impl Decision {
    fn flow_input(&self) -> (FlowEvent, FlowContext) {
        match self {
            Self::Escalate { event, reason, .. } => (*event, FlowContext::escalating(reason.clone())),
            Self::Approve(_) => (FlowEvent::ApprovalRequired, FlowContext::default()),
            Self::Respond { .. } => (FlowEvent::ResponseDispatched, FlowContext::default()),
        }
    }
}

/// Per-email inputs shared by every routing step.
struct Turn<'a> {
    email: &'a Email,
    classification: &'a ClassificationResult,
    sentiment: &'a SentimentAssessment,
    settings: &'a TenantSettings,
    thread: Option<&'a ThreadContext>,
    sink: &'a InMemoryActivitySink,
    activity: &'a ActivityContext,
    now: DateTime<Utc>,
}

pub struct DecisionRuntime {
    pub(crate) repos: Repositories,
    pub(crate) dispatcher: Arc<dyn EmailDispatcher>,
    pub(crate) renderer: ReplyRenderer,
    linker: ThreadLinker,
    classifier: IntentClassifier,
    sentiment: SentimentAdapter,
    pub(crate) responses: ResponseBuilder,
    matcher: RuleMatcher,
    thresholds: DecisionThresholds,
    flow: FlowEngine<EmailDecisionFlow>,
}

impl DecisionRuntime {
    pub fn new(
        repos: Repositories,
        collaborators: Collaborators,
        llm: Arc<dyn LlmClient>,
        sentiment: SentimentAdapter,
        options: RuntimeOptions,
    ) -> Result<Self, RuntimeError> {
        Ok(Self {
            linker: ThreadLinker::new(repos.emails.clone()),
            classifier: IntentClassifier::new(llm.clone(), options.classifier_timeout),
            dispatcher: collaborators.dispatcher.clone(),
            responses: ResponseBuilder::new(collaborators, llm),
            renderer: ReplyRenderer::new()?,
            matcher: RuleMatcher::new(options.thresholds.general_rule_fallback_confidence),
            thresholds: options.thresholds,
            flow: FlowEngine::default(),
            sentiment,
            repos,
        })
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub async fn process(
        &self,
        tenant_id: TenantId,
        inbound: InboundEmail,
    ) -> Result<ProcessReport, RuntimeError> {
        let now = Utc::now();
        let mut email = Email::received(tenant_id, inbound, now);

        if let Err(error) = self.repos.emails.insert(email.clone()).await {
            if error.is_duplicate() {
                info!(
                    event_name = "engine.email.duplicate",
                    tenant_id = %email.tenant_id,
                    message_id = %email.message_id.0,
                    "duplicate delivery rejected"
                );
                return Err(RuntimeError::Duplicate {
                    tenant_id: email.tenant_id,
                    message_id: email.message_id.0,
                });
            }
            return Err(error.into());
        }
        info!(
            event_name = "engine.email.received",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            "email accepted for processing"
        );

        let settings = self.tenant_settings(&email.tenant_id).await;
        let thread = self.link_thread(&mut email, now).await;

        let sink = InMemoryActivitySink::default();
        let activity = ActivityContext::new(email.tenant_id.clone(), Some(email.id.clone()), ENGINE_ACTOR)
            .with_thread(email.thread_id.clone());
        sink.emit(
            activity
                .entry("email.received", ActivityCategory::Ingress, ActivityOutcome::Success)
                .with_metadata("message_id", email.message_id.0.clone()),
        );

        let classification = self.classifier.classify(&email.subject, &email.body, thread.as_ref()).await;
        email.classification = Some(classification.classification);
        email.confidence = Some(classification.confidence);
        sink.emit(
            activity
                .entry("email.classified", ActivityCategory::Classification, ActivityOutcome::Success)
                .with_metadata("classification", classification.classification.as_str())
                .with_metadata("confidence", classification.confidence.to_string()),
        );
        info!(
            event_name = "engine.email.classified",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            thread_id = email.thread_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default(),
            classification = classification.classification.as_str(),
            confidence = classification.confidence,
            "email classified"
        );

        let classified = self
            .flow
            .apply_with_audit(
                &self.flow.initial_state(),
                &FlowEvent::ClassificationCompleted,
                &FlowContext::default(),
                &sink,
                &activity,
            )?
            .to;

        let sentiment = self.sentiment.assess(&email.body).await;

        let turn = Turn {
            email: &email,
            classification: &classification,
            sentiment: &sentiment,
            settings: &settings,
            thread: thread.as_ref(),
            sink: &sink,
            activity: &activity,
            now,
        };
        let decision = self.decide(&turn).await?;
        let outcome = self.commit(&mut email, classified, decision, &sink, &activity, now).await?;

        self.flush_activity(&sink).await;

        Ok(ProcessReport {
            email_id: email.id,
            thread_id: email.thread_id,
            classification,
            sentiment: sentiment.analysis,
            outcome,
        })
    }

    async fn decide(&self, turn: &Turn<'_>) -> Result<Decision, RuntimeError> {
        if let Route::Escalate(escalation) =
            route(turn.classification, turn.sentiment.override_decision.as_ref(), &self.thresholds)
        {
            return Ok(Decision::Escalate {
                event: FlowEvent::EscalationTriggered,
                priority: escalation.priority,
                reason: escalation.reason,
            });
        }

        let rules = self.repos.rules.list_for_tenant(&turn.email.tenant_id).await?;
        let rule = self.matcher.find_rule(
            &rules,
            turn.classification.classification,
            turn.classification.confidence,
        );

        match (route_with_rule(rule), rule) {
            (Ok(RuleRoute::QueueForApproval), Some(rule)) => Ok(self.queue_for_approval(turn, rule).await),
            (Ok(RuleRoute::AutoRespond), Some(rule)) => Ok(self.auto_respond(turn, rule).await),
            (Err(reason), _) => Ok(self.escalate(turn, FlowEvent::EscalationTriggered, reason.to_string())),
            (Ok(_), None) => {
                Ok(self.escalate(turn, FlowEvent::EscalationTriggered, NO_MATCHING_RULE.to_string()))
            }
        }
    }

    /// Workflows are carried on the item and run only when a reviewer releases it.
    async fn queue_for_approval(&self, turn: &Turn<'_>, rule: &AutomationRule) -> Decision {
        let proposal = match self.responses.propose(&handler_request(turn, rule)).await {
            Ok(proposal) => proposal,
            Err(error) => return self.response_failed(turn, format!("{FAILED_TO_SEND}: {error}")),
        };

        let confidence =
            sentiment_adjusted_confidence(proposal.candidate.confidence, turn.sentiment.analysis.as_ref());
        let item = ApprovalItem::pending(
            turn.email.tenant_id.clone(),
            turn.email.id.clone(),
            rule.id.clone(),
            turn.classification.classification,
            confidence,
            proposal.candidate.text,
            turn.now,
        );
        Decision::Approve(item.with_action(proposal.action))
    }

    async fn auto_respond(&self, turn: &Turn<'_>, rule: &AutomationRule) -> Decision {
        let candidate = match self.responses.build(&handler_request(turn, rule)).await {
            Ok(candidate) => candidate,
            Err(error) => return self.response_failed(turn, format!("{FAILED_TO_SEND}: {error}")),
        };

        let verdict = SafetyGuard::for_tenant(turn.settings).validate(
            &candidate.text,
            &turn.email.body,
            turn.classification.classification,
        );
        record_verdict(&verdict, turn.email, turn.sink, turn.activity);

        let (body, corrected) = match verdict.decision(&candidate.text) {
            GuardDecision::Send { body, corrected } => (body, corrected),
            GuardDecision::Block => return self.response_failed(turn, BLOCKED_BY_SAFETY_GUARD.to_string()),
        };

        if let Err(error) = self.send_reply(turn.email, turn.settings, &body).await {
            warn!(
                event_name = "engine.dispatch.failed",
                tenant_id = %turn.email.tenant_id,
                email_id = %turn.email.id.0,
                error = %error,
                "reply dispatch failed"
            );
            turn.sink.emit(
                turn.activity
                    .entry("reply.dispatch_failed", ActivityCategory::Dispatch, ActivityOutcome::Failed)
                    .with_metadata("error", error.to_string()),
            );
            return self.response_failed(turn, FAILED_TO_SEND.to_string());
        }

        turn.sink.emit(
            turn.activity
                .entry("reply.dispatched", ActivityCategory::Dispatch, ActivityOutcome::Success)
                .with_metadata("rule_id", rule.id.0.clone())
                .with_metadata("corrected", corrected.to_string()),
        );

        // Below the escalation threshold the reply only holds the customer until a human follows up.
        if candidate.confidence < self.thresholds.escalation_confidence {
            let reason = format!(
                "{HOLDING_REPLY_SENT}; reply confidence {}% < {}%",
                candidate.confidence, self.thresholds.escalation_confidence
            );
            return self.escalate(turn, FlowEvent::EscalationTriggered, reason);
        }
        Decision::Respond { rule_id: rule.id.clone(), corrected }
    }

    fn response_failed(&self, turn: &Turn<'_>, reason: String) -> Decision {
        self.escalate(turn, FlowEvent::ResponseFailed, reason)
    }

    fn escalate(&self, turn: &Turn<'_>, event: FlowEvent, reason: String) -> Decision {
        let priority = escalation_priority(
            turn.classification,
            turn.sentiment.override_decision.as_ref(),
            &self.thresholds,
        );
        Decision::Escalate { event, priority, reason }
    }

    /// Persists the decision, then records the transition. A storage failure
    /// records `Failed` instead and leaves the email `processing`.
    async fn commit(
        &self,
        email: &mut Email,
        classified: FlowState,
        decision: Decision,
        sink: &InMemoryActivitySink,
        activity: &ActivityContext,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, RuntimeError> {
        let (event, context) = decision.flow_input();
        let target = self.flow.apply(&classified, &event, &context)?;

        email.status = target.to.email_status();
        email.escalation_reason = context.escalation_reason.clone();
        email.processed_at = Some(now);

        match self.persist(email, decision, now).await {
            Ok(outcome) => {
                self.flow.apply_with_audit(&classified, &event, &context, sink, activity)?;
                log_outcome(email, &outcome);
                Ok(outcome)
            }
            Err(persist_error) => {
                error!(
                    event_name = "engine.outcome.persist_failed",
                    tenant_id = %email.tenant_id,
                    email_id = %email.id.0,
                    error = %persist_error,
                    "routing outcome could not be stored"
                );
                let failed = self.flow.apply_with_audit(
                    &classified,
                    &FlowEvent::OutcomePersistFailed,
                    &FlowContext::default(),
                    sink,
                    activity,
                )?;
                email.status = failed.to.email_status();
                Ok(ProcessOutcome::Failed { reason: persist_error.to_string() })
            }
        }
    }

    async fn persist(
        &self,
        email: &Email,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, RepositoryError> {
        match decision {
            Decision::Escalate { priority, reason, .. } => {
                let item = EscalationItem::pending(
                    email.tenant_id.clone(),
                    email.id.clone(),
                    email.classification,
                    priority,
                    reason.clone(),
                    now,
                );
                let escalation_id = item.id.clone();
                self.repos.escalations.save(item).await?;
                self.repos.emails.update_outcome(email).await?;
                Ok(ProcessOutcome::Escalated { escalation_id, priority, reason })
            }
            Decision::Approve(item) => {
                let approval_id = item.id.clone();
                let confidence = item.confidence;
                self.repos.approvals.save(item).await?;
                self.repos.emails.update_outcome(email).await?;
                Ok(ProcessOutcome::AwaitingApproval { approval_id, confidence })
            }
            Decision::Respond { rule_id, corrected } => {
                self.repos.emails.update_outcome(email).await?;
                self.repos.rules.record_trigger(&rule_id, now).await?;
                Ok(ProcessOutcome::AutoResponded { rule_id, corrected })
            }
        }
    }

    /// Renders and hands the reply to the dispatcher. The reply goes back to
    /// the customer from the address they wrote to.
    pub(crate) async fn send_reply(
        &self,
        email: &Email,
        settings: &TenantSettings,
        text: &str,
    ) -> Result<(), SendError> {
        let outbound = OutboundEmail {
            tenant_id: email.tenant_id.clone(),
            to: email.from_address.clone(),
            from: email.to_address.clone(),
            subject: reply_subject(&email.subject),
            html: self.renderer.render_html(text, &settings.company_name)?,
            text: text.to_string(),
        };

        match self.dispatcher.send(&outbound).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SendError::Refused),
            Err(error) => Err(SendError::Transport(error.to_string())),
        }
    }

    pub(crate) async fn tenant_settings(&self, tenant_id: &TenantId) -> TenantSettings {
        match self.repos.tenants.find(tenant_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => TenantSettings::defaults_for(tenant_id.clone()),
            Err(error) => {
                warn!(
                    event_name = "engine.tenant_settings.unavailable",
                    tenant_id = %tenant_id,
                    error = %error,
                    "using default tenant settings"
                );
                TenantSettings::defaults_for(tenant_id.clone())
            }
        }
    }

    async fn link_thread(&self, email: &mut Email, now: DateTime<Utc>) -> Option<ThreadContext> {
        let placement = match self.linker.link(email, now).await {
            Ok(placement) => placement,
            Err(error) => {
                warn!(
                    event_name = "engine.thread.link_failed",
                    tenant_id = %email.tenant_id,
                    email_id = %email.id.0,
                    error = %error,
                    "continuing without thread context"
                );
                return None;
            }
        };

        email.thread_id = Some(placement.thread_id.clone());
        email.thread_position = Some(placement.position);
        email.is_thread_start = placement.is_thread_start;

        match self.linker.context(email, &placement).await {
            Ok(context) => Some(context),
            Err(error) => {
                warn!(
                    event_name = "engine.thread.context_failed",
                    tenant_id = %email.tenant_id,
                    email_id = %email.id.0,
                    thread_id = %placement.thread_id.0,
                    error = %error,
                    "continuing without thread context"
                );
                None
            }
        }
    }

    pub(crate) async fn flush_activity(&self, sink: &InMemoryActivitySink) {
        let entries = sink.drain();
        if let Err(error) = self.repos.activity.append(&entries).await {
            warn!(
                event_name = "engine.activity.flush_failed",
                entries = entries.len(),
                error = %error,
                "activity entries dropped"
            );
        }
    }
}

fn handler_request<'a>(turn: &Turn<'a>, rule: &'a AutomationRule) -> HandlerRequest<'a> {
    HandlerRequest {
        email: turn.email,
        classification: turn.classification,
        rule,
        settings: turn.settings,
        thread: turn.thread,
        now: turn.now,
    }
}

pub(crate) fn record_verdict(
    verdict: &SafetyVerdict,
    email: &Email,
    sink: &InMemoryActivitySink,
    activity: &ActivityContext,
) {
    let Some(risk) = verdict.risk_level else {
        return;
    };
    warn!(
        event_name = "engine.safety.violation",
        tenant_id = %email.tenant_id,
        email_id = %email.id.0,
        risk = risk.as_str(),
        rules = %verdict.rule_ids(),
        corrected = verdict.corrected_response.is_some(),
        "safety guard flagged a candidate reply"
    );
    let outcome = if verdict.safe || verdict.corrected_response.is_some() {
        ActivityOutcome::Success
    } else {
        ActivityOutcome::Rejected
    };
    sink.emit(
        activity
            .entry("safety.violation", ActivityCategory::Safety, outcome)
            .with_metadata("risk", risk.as_str())
            .with_metadata("rules", verdict.rule_ids())
            .with_metadata("corrected", verdict.corrected_response.is_some().to_string()),
    );
}

fn log_outcome(email: &Email, outcome: &ProcessOutcome) {
    let thread_id = email.thread_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default();
    match outcome {
        ProcessOutcome::Escalated { priority, reason, .. } => info!(
            event_name = "engine.email.escalated",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            thread_id,
            priority = priority.as_str(),
            reason = %reason,
            "email escalated to a human"
        ),
        ProcessOutcome::AwaitingApproval { approval_id, confidence } => info!(
            event_name = "engine.email.awaiting_approval",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            thread_id,
            approval_id = %approval_id.0,
            confidence,
            "reply queued for approval"
        ),
        ProcessOutcome::AutoResponded { rule_id, corrected } => info!(
            event_name = "engine.email.auto_responded",
            tenant_id = %email.tenant_id,
            email_id = %email.id.0,
            thread_id,
            rule_id = %rule_id.0,
            corrected,
            "reply sent"
        ),
        ProcessOutcome::Failed { .. } => {}
    }
}

pub(crate) fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else {
        format!("Re: {trimmed}")
    }
}
