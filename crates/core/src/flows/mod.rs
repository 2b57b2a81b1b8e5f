pub mod engine;
pub mod routing;
pub mod states;

pub use engine::{EmailDecisionFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use routing::{
    escalation_priority, route, route_with_rule, EscalationDecision, Route, RuleRoute,
    BLOCKED_BY_SAFETY_GUARD, FAILED_TO_SEND, NO_MATCHING_RULE,
};
pub use states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};
