use std::collections::BTreeMap;

use replyguard_core::audit::{ActivityCategory, ActivityLogEntry, ActivityOutcome};
use replyguard_core::domain::email::{EmailId, ThreadId};
use replyguard_core::domain::tenant::TenantId;

use super::{column, parse_enum, parse_timestamp, ActivityLogRepository, RepositoryError};
use crate::DbPool;

const ACTIVITY_COLUMNS: &str =
    "id, tenant_id, email_id, thread_id, action, category, actor, outcome, metadata_json, occurred_at";

/// Append-only. There is deliberately no update or delete path.
pub struct SqlActivityLogRepository {
    pool: DbPool,
}

impl SqlActivityLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<ActivityLogEntry, RepositoryError> {
    let email_id: Option<String> = column(row, "email_id")?;
    let thread_id: Option<String> = column(row, "thread_id")?;
    let category: String = column(row, "category")?;
    let outcome: String = column(row, "outcome")?;
    let metadata_json: String = column(row, "metadata_json")?;
    let occurred_at: String = column(row, "occurred_at")?;

    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

    Ok(ActivityLogEntry {
        id: column(row, "id")?,
        tenant_id: TenantId(column(row, "tenant_id")?),
        email_id: email_id.map(EmailId),
        thread_id: thread_id.map(ThreadId),
        action: column(row, "action")?,
        category: parse_enum("category", &category, ActivityCategory::parse)?,
        actor: column(row, "actor")?,
        outcome: parse_enum("outcome", &outcome, ActivityOutcome::parse)?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", &occurred_at)?,
    })
}

#[async_trait::async_trait]
impl ActivityLogRepository for SqlActivityLogRepository {
    async fn append(&self, entries: &[ActivityLogEntry]) -> Result<(), RepositoryError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata)
                .map_err(|e| RepositoryError::Decode(format!("metadata_json: {e}")))?;

            sqlx::query(
                "INSERT INTO activity_log (id, tenant_id, email_id, thread_id, action, category,
                                           actor, outcome, metadata_json, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.id)
            .bind(&entry.tenant_id.0)
            .bind(entry.email_id.as_ref().map(|id| id.0.as_str()))
            .bind(entry.thread_id.as_ref().map(|id| id.0.as_str()))
            .bind(&entry.action)
            .bind(entry.category.as_str())
            .bind(&entry.actor)
            .bind(entry.outcome.as_str())
            .bind(metadata_json)
            .bind(entry.occurred_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn list_for_email(
        &self,
        email_id: &EmailId,
    ) -> Result<Vec<ActivityLogEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_log
             WHERE email_id = ?
             ORDER BY occurred_at ASC, rowid ASC"
        ))
        .bind(&email_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ActivityLogEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activity_log
             WHERE tenant_id = ?
             ORDER BY occurred_at DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(&tenant_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
