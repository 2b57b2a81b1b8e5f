//! SQLite persistence for emails, automation rules, the approval and escalation
//! queues, tenant settings, and the activity log.
//!
//! Each store is a trait in [`repositories`] with a sqlx implementation and an
//! in-memory twin used by tests and by the agent runtime's fixtures.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use migrations::MigrationStatus;
pub use repositories::RepositoryError;
