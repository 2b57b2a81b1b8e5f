//! The replyguard decision engine.
//!
//! An inbound email is linked into its thread, classified, checked for
//! strongly negative sentiment and routed to one of three outcomes: a human
//! escalation, an approval item holding a proposed reply, or an automatic reply.
//! Every reply passes the safety guard immediately before dispatch.
//!
//! The model never decides refunds, offers or account changes. Those come from
//! rule configuration and the collaborators in [`tools`].

pub mod classifier;
pub mod conversation;
pub mod desk;
pub mod guardrails;
pub mod llm;
pub mod responses;
pub mod runtime;
pub mod sentiment;
pub mod templates;
pub mod tools;

#[cfg(test)]
mod testing;

pub use desk::{DeskError, Rejection};
pub use runtime::{
    DecisionRuntime, ProcessOutcome, ProcessReport, Repositories, RuntimeError, RuntimeOptions,
};
