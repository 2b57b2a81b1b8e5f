pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod offers;
pub mod rules;
pub mod sentiment;
pub mod threading;
pub mod thresholds;

pub use audit::{
    ActivityCategory, ActivityContext, ActivityLogEntry, ActivityOutcome, ActivitySink,
    InMemoryActivitySink,
};
pub use domain::approval::{ApprovalId, ApprovalItem, ApprovalStatus};
pub use domain::email::{Email, EmailId, EmailStatus, InboundEmail, MessageId, ThreadId};
pub use domain::escalation::{EscalationId, EscalationItem, EscalationStatus};
pub use domain::intent::{ClassificationResult, Intent, Priority};
pub use domain::rule::{AutomationRule, ResponseStrategy, RuleConfig, RuleId};
pub use domain::tenant::{EmpathyLevel, TenantId, TenantSettings};
pub use domain::thread::{ThreadContext, ThreadPlacement};
pub use errors::DomainError;
pub use rules::RuleMatcher;
pub use sentiment::{SentimentAnalysis, SentimentLabel, SentimentOverride, SentimentScores};
pub use thresholds::DecisionThresholds;
