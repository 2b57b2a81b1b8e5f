use replyguard_core::config::LoadOptions;
use replyguard_db::migrations;

use crate::commands::{with_migrated_pool, with_pool, CommandResult};

pub fn run(options: &LoadOptions) -> CommandResult {
    match with_migrated_pool("migrate", options, |pool| async move {
        migrations::status(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))
    }) {
        Ok(status) => CommandResult::success(
            "migrate",
            format!("schema is current; {} migrations applied", status.applied.len()),
        ),
        Err(failure) => failure,
    }
}

/// Reports migration state without applying anything.
pub fn status(options: &LoadOptions) -> CommandResult {
    match with_pool("migrate", options, false, |pool| async move {
        migrations::status(&pool).await.map_err(|error| ("db_connectivity", error.to_string(), 4u8))
    }) {
        Ok(status) if status.is_current() => CommandResult::success(
            "migrate",
            format!("schema is current; {} migrations applied", status.applied.len()),
        ),
        Ok(status) => CommandResult::success(
            "migrate",
            format!(
                "{} applied, {} pending: {}",
                status.applied.len(),
                status.pending.len(),
                status.pending.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
            ),
        ),
        Err(failure) => failure,
    }
}
