use thiserror::Error;

use crate::audit::{ActivityCategory, ActivityContext, ActivityOutcome, ActivitySink};
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// `Received -> Classified -> {Escalated | AwaitingApproval | AutoResponded | Failed}`.
#[derive(Clone, Debug, Default)]
pub struct EmailDecisionFlow;

impl FlowDefinition for EmailDecisionFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Received
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_email_decision(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        activity: &ActivityContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: ActivitySink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                let mut entry = activity
                    .entry("flow.transition_applied", ActivityCategory::Routing, ActivityOutcome::Success)
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", outcome.event.as_str());
                if let Some(reason) = &context.escalation_reason {
                    entry = entry.with_metadata("reason", reason.clone());
                }
                sink.emit(entry);
            }
            Err(error) => {
                sink.emit(
                    activity
                        .entry(
                            "flow.transition_rejected",
                            ActivityCategory::Routing,
                            ActivityOutcome::Rejected,
                        )
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<EmailDecisionFlow> {
    fn default() -> Self {
        Self::new(EmailDecisionFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("escalation from {state:?} requires a reason")]
    MissingEscalationReason { state: FlowState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
}

fn transition_email_decision(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        CreateApprovalItem, CreateEscalation, IncrementRuleTrigger, LookUpRule, MarkResolved,
    };
    use FlowEvent::{
        ApprovalRequired, ClassificationCompleted, EscalationTriggered, OutcomePersistFailed,
        ResponseDispatched, ResponseFailed,
    };
    use FlowState::{AutoResponded, AwaitingApproval, Classified, Escalated, Failed, Received};

    let (to, actions) = match (current, event) {
        (Received, ClassificationCompleted) => (Classified, vec![LookUpRule]),
        (Classified, EscalationTriggered) | (Classified, ResponseFailed) => {
            let has_reason =
                context.escalation_reason.as_deref().is_some_and(|reason| !reason.trim().is_empty());
            if !has_reason {
                return Err(FlowTransitionError::MissingEscalationReason { state: *current });
            }
            (Escalated, vec![CreateEscalation])
        }
        (Classified, ApprovalRequired) => (AwaitingApproval, vec![CreateApprovalItem]),
        (Classified, ResponseDispatched) => (AutoResponded, vec![MarkResolved, IncrementRuleTrigger]),
        (Classified, OutcomePersistFailed) => (Failed, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition { state: *current, event: *event });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}
