pub mod approval;
pub mod email;
pub mod escalation;
pub mod intent;
pub mod rule;
pub mod tenant;
pub mod thread;
