use thiserror::Error;

use crate::domain::approval::ApprovalStatus;
use crate::domain::escalation::EscalationStatus;

/// Lifecycle violations on review items. Callers treat these as conflicts with
/// the item's current state, never as storage failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("approval is already {}; cannot move to {}", from.as_str(), to.as_str())]
    InvalidApprovalTransition { from: ApprovalStatus, to: ApprovalStatus },
    #[error("escalation is {}; cannot move to {}", from.as_str(), to.as_str())]
    InvalidEscalationTransition { from: EscalationStatus, to: EscalationStatus },
}
