//! Candidate replies, one handler per intent.
//!
//! Handlers never dispatch anything. They return the text they would send and
//! the confidence they have in it; the runtime decides what happens next.
//! Order cancellation, address change and subscription change are workflows
//! that mutate the customer's account. [`ResponseBuilder::propose`] only
//! describes them; they run when a reply is sent without review or when a
//! reviewer releases it through [`ResponseBuilder::execute`].

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::warn;

use replyguard_core::domain::approval::ApprovalAction;
use replyguard_core::domain::email::Email;
use replyguard_core::domain::intent::{ClassificationResult, Intent};
use replyguard_core::domain::rule::{AutomationRule, ResponseStrategy};
use replyguard_core::domain::tenant::TenantSettings;
use replyguard_core::domain::thread::ThreadContext;
use replyguard_core::offers::{select_promo, RefundOutcome};

use crate::llm::LlmClient;
use crate::templates::{render_rule_template, TemplateVars};
use crate::tools::Collaborators;

/// Confidence lost when the order lookup could not back up a status reply.
const LOOKUP_FALLBACK_PENALTY: u8 = 25;
const REVIEW_FALLBACK_CONFIDENCE: u8 = 20;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("no order number found in the email")]
    MissingOrderNumber,
    #[error("order {0} was not found")]
    OrderNotFound(String),
    #[error("rule {rule} has no {what} configured")]
    MissingConfig { rule: String, what: &'static str },
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("workflow failed: {0}")]
    Workflow(String),
    #[error("template failed: {0}")]
    Template(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateResponse {
    pub text: String,
    pub confidence: u8,
}

/// What goes into the approval queue: the reply a reviewer reads and the
/// workflow that runs if they release it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub candidate: CandidateResponse,
    pub action: Option<ApprovalAction>,
}

pub struct HandlerRequest<'a> {
    pub email: &'a Email,
    pub classification: &'a ClassificationResult,
    pub rule: &'a AutomationRule,
    pub settings: &'a TenantSettings,
    pub thread: Option<&'a ThreadContext>,
    pub now: DateTime<Utc>,
}

impl HandlerRequest<'_> {
    fn reply(&self, body: &str, confidence: u8) -> CandidateResponse {
        CandidateResponse { text: signed(self.settings, body), confidence: confidence.min(100) }
    }

    fn action(&self) -> Result<Option<ApprovalAction>, HandlerError> {
        Ok(match self.classification.classification {
            Intent::OrderCancellation => Some(ApprovalAction::CancelOrder {
                order_number: self.order_number().ok_or(HandlerError::MissingOrderNumber)?,
            }),
            Intent::AddressChange => Some(ApprovalAction::ChangeAddress { order_number: self.order_number() }),
            Intent::SubscriptionChanges => Some(ApprovalAction::ChangeSubscription),
            _ => None,
        })
    }

    fn order_number(&self) -> Option<String> {
        extract_order_number(&self.email.subject).or_else(|| extract_order_number(&self.email.body))
    }
}

fn order_number_regex() -> &'static Regex {
    static ORDER_NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    ORDER_NUMBER_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:#\s?|\border\s*(?:number|no\.?|num|id)?\s*[:#]?\s*)([A-Z0-9][A-Z0-9-]{2,19})\b")
            .expect("order number regex must compile")
    })
}

/// Recognizes `#4821`, `order 4821`, `order number: 4821` and `order no. A-4821`.
/// Candidates must contain at least one digit.
pub fn extract_order_number(text: &str) -> Option<String> {
    order_number_regex()
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|found| found.as_str().trim_end_matches('-'))
        .find(|candidate| candidate.chars().any(|ch| ch.is_ascii_digit()))
        .map(str::to_string)
}

pub struct ResponseBuilder {
    collaborators: Collaborators,
    llm: Arc<dyn LlmClient>,
}

impl ResponseBuilder {
    pub fn new(collaborators: Collaborators, llm: Arc<dyn LlmClient>) -> Self {
        Self { collaborators, llm }
    }

    /// The reply for an email that goes out without review. Workflows run here.
    pub async fn build(&self, request: &HandlerRequest<'_>) -> Result<CandidateResponse, HandlerError> {
        if request.rule.strategy == ResponseStrategy::Template {
            return self.template(request);
        }

        match request.classification.classification {
            Intent::OrderStatus => Ok(self.order_status(request).await),
            Intent::DiscountInquiry => self.discount_inquiry(request).await,
            Intent::PromoRefund => self.promo_refund(request).await,
            Intent::OrderCancellation | Intent::AddressChange | Intent::SubscriptionChanges => {
                self.workflow(request).await
            }
            Intent::ReturnRequest
            | Intent::AccountCancellation
            | Intent::PaymentIssue
            | Intent::ProductQuestion
            | Intent::Escalation
            | Intent::HumanEscalation
            | Intent::General => Ok(self.general(request).await),
        }
    }

    /// The reply for an email that waits for a reviewer. Nothing is mutated:
    /// a workflow is described to the customer and carried on the proposal.
    pub async fn propose(&self, request: &HandlerRequest<'_>) -> Result<Proposal, HandlerError> {
        if request.rule.strategy != ResponseStrategy::Template {
            if let Some(action) = request.action()? {
                let candidate = request.reply(action_preview(&action), request.classification.confidence);
                return Ok(Proposal { candidate, action: Some(action) });
            }
        }
        Ok(Proposal { candidate: self.build(request).await?, action: None })
    }

    /// Runs a workflow a reviewer released and returns the signed reply that
    /// reports its result.
    pub async fn execute(
        &self,
        email: &Email,
        settings: &TenantSettings,
        action: &ApprovalAction,
    ) -> Result<String, HandlerError> {
        let message = self.run(email, action).await?;
        Ok(signed(settings, &message))
    }

    async fn workflow(&self, request: &HandlerRequest<'_>) -> Result<CandidateResponse, HandlerError> {
        let Some(action) = request.action()? else {
            return Ok(self.general(request).await);
        };
        let message = self.run(request.email, &action).await?;
        Ok(request.reply(&message, request.classification.confidence))
    }

    /// The reply is the workflow's own result message, so what we say matches what happened.
    async fn run(&self, email: &Email, action: &ApprovalAction) -> Result<String, HandlerError> {
        let tenant_id = &email.tenant_id;
        let customer = &email.from_address;
        let outcome = match action {
            ApprovalAction::CancelOrder { order_number } => {
                self.collaborators.fulfillment.cancel_order(tenant_id, order_number, customer).await
            }
            ApprovalAction::ChangeAddress { order_number } => {
                self.collaborators
                    .fulfillment
                    .change_address(tenant_id, order_number.as_deref(), customer, &email.body)
                    .await
            }
            ApprovalAction::ChangeSubscription => {
                self.collaborators.subscriptions.apply_change(tenant_id, customer, &email.body).await
            }
        }
        .map_err(|error| HandlerError::Workflow(error.to_string()))?;

        if !outcome.success {
            return Err(HandlerError::Workflow(outcome.message));
        }
        Ok(outcome.message)
    }

    fn template(&self, request: &HandlerRequest<'_>) -> Result<CandidateResponse, HandlerError> {
        let template = request.rule.config.template.as_deref().ok_or_else(|| {
            HandlerError::MissingConfig { rule: request.rule.id.0.clone(), what: "template" }
        })?;
        let vars = TemplateVars {
            customer_email: request.email.from_address.clone(),
            order_number: request.order_number(),
            company_name: request.settings.company_name.clone(),
            subject: request.email.subject.clone(),
            signature: request.settings.support_signature.clone(),
        };
        let text = render_rule_template(template, &vars)
            .map_err(|error| HandlerError::Template(error.to_string()))?;

        Ok(CandidateResponse { text, confidence: request.classification.confidence })
    }

    async fn order_status(&self, request: &HandlerRequest<'_>) -> CandidateResponse {
        let confidence = request.classification.confidence;
        let fallback = |request: &HandlerRequest<'_>| {
            request.reply(
                "Thanks for checking in. We're looking into your order now and will follow up \
                 with an update shortly.",
                confidence.saturating_sub(LOOKUP_FALLBACK_PENALTY),
            )
        };

        let Some(order_number) = request.order_number() else {
            return fallback(request);
        };
        let order = match self.collaborators.orders.find_order(&request.email.tenant_id, &order_number).await {
            Ok(Some(order)) => order,
            Ok(None) => return fallback(request),
            Err(error) => {
                warn!(
                    event_name = "handler.order_status.lookup_failed",
                    tenant_id = %request.email.tenant_id,
                    email_id = %request.email.id.0,
                    error = %error,
                    "order lookup failed"
                );
                return fallback(request);
            }
        };

        let mut body = format!("Your order #{} is currently {}.", order.order_number, order.status);
        match (&order.carrier, &order.tracking_number) {
            (Some(carrier), Some(tracking)) => {
                body.push_str(&format!(" It's travelling with {carrier}, tracking number {tracking}."));
            }
            (None, Some(tracking)) => body.push_str(&format!(" Your tracking number is {tracking}.")),
            _ => {}
        }
        if let Some(url) = &order.tracking_url {
            body.push_str(&format!(" You can follow it here: {url}"));
        }
        if let Some(prediction) = &order.carrier_prediction {
            body.push_str(&format!("\n\nThe carrier currently predicts: {prediction}."));
        } else if let Some(date) = order.estimated_delivery {
            body.push_str(&format!("\n\nEstimated delivery: {}.", date.format("%A, %B %-d")));
        }

        request.reply(&body, confidence)
    }

    async fn discount_inquiry(
        &self,
        request: &HandlerRequest<'_>,
    ) -> Result<CandidateResponse, HandlerError> {
        let prior_orders = self
            .collaborators
            .orders
            .completed_order_count(&request.email.tenant_id, &request.email.from_address)
            .await
            .map_err(|error| HandlerError::Lookup(error.to_string()))?;

        let body = match select_promo(&request.rule.config.promotions, prior_orders, request.now) {
            Some(offer) => format!(
                "Good news! You can use code {} for {}. Just enter it at checkout.",
                offer.code, offer.description
            ),
            None => "Thanks for asking! We don't have a promotion running for your account right \
                     now, but we'll be sure to let you know when one comes up."
                .to_string(),
        };
        Ok(request.reply(&body, request.classification.confidence))
    }

    async fn promo_refund(
        &self,
        request: &HandlerRequest<'_>,
    ) -> Result<CandidateResponse, HandlerError> {
        let policy = request.rule.config.refund.as_ref().ok_or_else(|| HandlerError::MissingConfig {
            rule: request.rule.id.0.clone(),
            what: "refund policy",
        })?;
        let order_number = request.order_number().ok_or(HandlerError::MissingOrderNumber)?;
        let order = self
            .collaborators
            .orders
            .find_order(&request.email.tenant_id, &order_number)
            .await
            .map_err(|error| HandlerError::Lookup(error.to_string()))?
            .ok_or_else(|| HandlerError::OrderNotFound(order_number.clone()))?;

        let body = match policy.calculate(order.total) {
            RefundOutcome::Eligible { amount, .. } => format!(
                "We've approved a refund of ${:.2} for order #{}. It will go back to your original \
                 payment method within 5-7 business days.",
                amount, order.order_number
            ),
            RefundOutcome::Ineligible { reason } => format!(
                "We looked into order #{} and unfortunately it doesn't qualify for this \
                 adjustment: {reason}.",
                order.order_number
            ),
        };
        Ok(request.reply(&body, request.classification.confidence))
    }

    async fn general(&self, request: &HandlerRequest<'_>) -> CandidateResponse {
        let prompt = general_prompt(request);
        match self.llm.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => CandidateResponse {
                text: text.trim().to_string(),
                confidence: request.classification.confidence,
            },
            Ok(_) => review_fallback(request),
            Err(error) => {
                warn!(
                    event_name = "handler.general.generation_failed",
                    tenant_id = %request.email.tenant_id,
                    email_id = %request.email.id.0,
                    error = %error,
                    "reply generation failed"
                );
                review_fallback(request)
            }
        }
    }
}

fn signed(settings: &TenantSettings, body: &str) -> String {
    format!("Hi,\n\n{}\n\n{}", body.trim(), settings.support_signature)
}

fn action_preview(action: &ApprovalAction) -> &'static str {
    match action {
        ApprovalAction::CancelOrder { .. } => {
            "We've received your cancellation request and will confirm as soon as the order is cancelled."
        }
        ApprovalAction::ChangeAddress { .. } => {
            "We've received your new delivery address and will confirm once the order is updated."
        }
        ApprovalAction::ChangeSubscription => {
            "We've received your subscription request and will confirm as soon as the change is made."
        }
    }
}

fn review_fallback(request: &HandlerRequest<'_>) -> CandidateResponse {
    request.reply(
        "Thanks for your message. This one needs a closer look from our team, and a member of \
         staff will review it and get back to you personally.",
        REVIEW_FALLBACK_CONFIDENCE,
    )
}

fn general_prompt(request: &HandlerRequest<'_>) -> String {
    let settings = request.settings;
    let mut prompt = format!(
        "You write customer-support replies for {}.\n{}\n\
         Answer only what the customer asked. Do not offer discounts, refunds, cancellations or \
         other plans unless the customer asked for them. Never mention competitors.\n",
        settings.company_name,
        settings.empathy_level.tone_instruction()
    );

    if !settings.knowledge_snippets.is_empty() {
        prompt.push_str("\nWhat you know about the business:\n");
        for snippet in &settings.knowledge_snippets {
            prompt.push_str(&format!("- {snippet}\n"));
        }
    }
    if let Some(thread) = request.thread.filter(|thread| thread.is_multi_turn()) {
        prompt.push_str("\nConversation so far:\n");
        prompt.push_str(&thread.summary);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nCustomer email\nSubject: {}\n{}\n\nWrite the reply body only, signed \"{}\".",
        request.email.subject.trim(),
        request.email.body.trim(),
        settings.support_signature
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use replyguard_core::domain::approval::ApprovalAction;
    use replyguard_core::domain::email::{Email, InboundEmail};
    use replyguard_core::domain::intent::{ClassificationResult, Intent, Priority};
    use replyguard_core::domain::rule::AutomationRule;
    use replyguard_core::domain::tenant::{TenantId, TenantSettings};
    use replyguard_core::offers::{PromoAudience, PromoOffer, RefundPolicy};

    use super::{extract_order_number, HandlerError, HandlerRequest, ResponseBuilder};
    use crate::llm::LlmClient;
    use crate::tools::{
        Collaborators, FulfillmentWorkflows, OrderDetails, OrderLookup, SubscriptionManager,
        WorkflowOutcome,
    };

    struct Orders {
        total: Decimal,
        prior_orders: u32,
    }

    #[async_trait]
    impl OrderLookup for Orders {
        async fn find_order(&self, _tenant: &TenantId, number: &str) -> Result<Option<OrderDetails>> {
            Ok(Some(OrderDetails {
                order_number: number.to_string(),
                status: "in transit".to_string(),
                total: self.total,
                carrier: Some("UPS".to_string()),
                tracking_number: Some("1Z999".to_string()),
                tracking_url: None,
                estimated_delivery: None,
                carrier_prediction: Some("delivery by Friday".to_string()),
            }))
        }

        async fn completed_order_count(&self, _tenant: &TenantId, _customer: &str) -> Result<u32> {
            Ok(self.prior_orders)
        }
    }

    struct PausingSubscriptions;

    #[async_trait]
    impl SubscriptionManager for PausingSubscriptions {
        async fn apply_change(&self, _tenant: &TenantId, _customer: &str, _request: &str) -> Result<WorkflowOutcome> {
            Ok(WorkflowOutcome {
                success: true,
                message: "Your subscription is paused until March 1.".to_string(),
            })
        }
    }

    struct RefusingFulfillment;

    #[async_trait]
    impl FulfillmentWorkflows for RefusingFulfillment {
        async fn cancel_order(&self, _tenant: &TenantId, _order: &str, _customer: &str) -> Result<WorkflowOutcome> {
            Ok(WorkflowOutcome { success: false, message: "order already shipped".to_string() })
        }

        async fn change_address(
            &self,
            _tenant: &TenantId,
            _order: Option<&str>,
            _customer: &str,
            _request: &str,
        ) -> Result<WorkflowOutcome> {
            Err(anyhow!("warehouse api down"))
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClient for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("rate limited"))
        }
    }

    fn builder(total: Decimal, prior_orders: u32) -> ResponseBuilder {
        let mut collaborators = Collaborators::unconfigured();
        collaborators.orders = Arc::new(Orders { total, prior_orders });
        collaborators.subscriptions = Arc::new(PausingSubscriptions);
        collaborators.fulfillment = Arc::new(RefusingFulfillment);
        ResponseBuilder::new(collaborators, Arc::new(FailingLlm))
    }

    fn email(subject: &str, body: &str) -> Email {
        Email::received(
            TenantId("t1".to_string()),
            InboundEmail {
                from_email: "c@example.com".to_string(),
                to_email: "help@shop.io".to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                message_id: "m1".to_string(),
            },
            Utc::now(),
        )
    }

    fn classified(intent: Intent, confidence: u8) -> ClassificationResult {
        ClassificationResult {
            classification: intent,
            confidence,
            priority: Some(Priority::Low),
            reasoning: String::new(),
        }
    }

    #[test]
    fn order_numbers_are_extracted_from_common_phrasings() {
        assert_eq!(extract_order_number("Where is #4821?").as_deref(), Some("4821"));
        assert_eq!(extract_order_number("about order 10443 please").as_deref(), Some("10443"));
        assert_eq!(extract_order_number("Order number: A-7781").as_deref(), Some("A-7781"));
        assert_eq!(extract_order_number("my order is late"), None);
        assert_eq!(extract_order_number("order status please"), None);
    }

    #[tokio::test]
    async fn refund_is_capped_by_rule_configuration() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::PromoRefund)
            .refund(RefundPolicy::percentage(Decimal::new(20, 0)).with_cap(Decimal::new(5, 0)))
            .build();
        let email = email("Price dropped", "The promo price dropped after I bought order #4821");
        let classification = classified(Intent::PromoRefund, 82);

        let candidate = builder(Decimal::new(40, 0), 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("refund reply");

        assert!(candidate.text.contains("refund of $5.00"), "{}", candidate.text);
        assert!(!candidate.text.contains("$8"));
    }

    #[tokio::test]
    async fn refund_without_order_number_is_a_handler_failure() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::PromoRefund)
            .refund(RefundPolicy::fixed(Decimal::new(5, 0)))
            .build();
        let email = email("Refund", "I want money back");
        let classification = classified(Intent::PromoRefund, 82);

        let error = builder(Decimal::new(40, 0), 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect_err("no order number");
        assert!(matches!(error, HandlerError::MissingOrderNumber));
    }

    #[tokio::test]
    async fn order_status_uses_carrier_prediction_and_falls_back_without_lookup() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::OrderStatus).build();
        let classification = classified(Intent::OrderStatus, 88);

        let found = email("Order #4821", "Where is it?");
        let candidate = builder(Decimal::new(40, 0), 0)
            .build(&HandlerRequest {
                email: &found,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("status reply");
        assert!(candidate.text.contains("#4821 is currently in transit"));
        assert!(candidate.text.contains("delivery by Friday"));
        assert_eq!(candidate.confidence, 88);

        let unconfigured = ResponseBuilder::new(Collaborators::unconfigured(), Arc::new(FailingLlm));
        let fallback = unconfigured
            .build(&HandlerRequest {
                email: &found,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("fallback reply");
        assert!(fallback.text.contains("looking into your order"));
        assert_eq!(fallback.confidence, 63);
    }

    #[tokio::test]
    async fn discount_inquiry_picks_offer_by_customer_history() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::DiscountInquiry)
            .promotion(PromoOffer {
                code: "WELCOME15".to_string(),
                description: "15% off your first order".to_string(),
                audience: PromoAudience::FirstTimeCustomers,
                active: true,
                expires_at: None,
            })
            .build();
        let email = email("Discount?", "Any codes available?");
        let classification = classified(Intent::DiscountInquiry, 90);
        let request = HandlerRequest {
            email: &email,
            classification: &classification,
            rule: &rule,
            settings: &settings,
            thread: None,
            now: Utc::now(),
        };

        let first_timer = builder(Decimal::ZERO, 0).build(&request).await.expect("offer");
        assert!(first_timer.text.contains("WELCOME15"));

        let returning = builder(Decimal::ZERO, 4).build(&request).await.expect("decline");
        assert!(!returning.text.contains("WELCOME15"));
    }

    #[tokio::test]
    async fn subscription_reply_is_the_mutation_result() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::SubscriptionChanges).build();
        let email = email("Pause", "Please pause my subscription until March");
        let classification = classified(Intent::SubscriptionChanges, 90);

        let candidate = builder(Decimal::ZERO, 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("subscription reply");
        assert!(candidate.text.contains("paused until March 1"));
    }

    #[tokio::test]
    async fn failed_workflows_are_handler_errors() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let cancel_rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::OrderCancellation).build();
        let email = email("Cancel order #4821", "Please cancel it");
        let classification = classified(Intent::OrderCancellation, 90);

        let error = builder(Decimal::ZERO, 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &cancel_rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect_err("already shipped");
        assert_eq!(error.to_string(), "workflow failed: order already shipped");
    }

    #[tokio::test]
    async fn proposals_describe_workflows_without_running_them() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::OrderCancellation)
            .requires_approval(true)
            .build();
        let email = email("Cancel order #4821", "Please cancel it");
        let classification = classified(Intent::OrderCancellation, 90);
        let builder = builder(Decimal::ZERO, 0);

        let proposal = builder
            .propose(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("proposal");
        assert_eq!(
            proposal.action,
            Some(ApprovalAction::CancelOrder { order_number: "4821".to_string() })
        );
        assert!(proposal.candidate.text.contains("cancellation request"));
        assert!(!proposal.candidate.text.contains("already shipped"));
        assert_eq!(proposal.candidate.confidence, 90);

        let action = proposal.action.expect("action");
        let error = builder.execute(&email, &settings, &action).await.expect_err("refused");
        assert_eq!(error.to_string(), "workflow failed: order already shipped");

        let released = builder
            .execute(&email, &settings, &ApprovalAction::ChangeSubscription)
            .await
            .expect("subscription result");
        assert!(released.contains("paused until March 1"));
        assert!(released.starts_with("Hi,"));
    }

    #[tokio::test]
    async fn general_generation_failure_uses_review_message() {
        let settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::General).build();
        let email = email("Hello", "Just wanted to say thanks");
        let classification = classified(Intent::General, 75);

        let candidate = builder(Decimal::ZERO, 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("fallback reply");
        assert!(candidate.text.contains("member of staff will review"));
        assert_eq!(candidate.confidence, 20);
    }

    #[tokio::test]
    async fn template_strategy_renders_rule_template() {
        let mut settings = TenantSettings::defaults_for(TenantId("t1".to_string()));
        settings.company_name = "Brewly".to_string();
        let rule = AutomationRule::builder(TenantId("t1".to_string()), Intent::ProductQuestion)
            .template("Thanks for asking {{ company_name }} about that!")
            .build();
        let email = email("Beans", "Are they organic?");
        let classification = classified(Intent::ProductQuestion, 77);

        let candidate = builder(Decimal::ZERO, 0)
            .build(&HandlerRequest {
                email: &email,
                classification: &classification,
                rule: &rule,
                settings: &settings,
                thread: None,
                now: Utc::now(),
            })
            .await
            .expect("template reply");
        assert_eq!(candidate.text, "Thanks for asking Brewly about that!");
        assert_eq!(candidate.confidence, 77);
    }
}
