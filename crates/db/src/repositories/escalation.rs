use replyguard_core::domain::email::EmailId;
use replyguard_core::domain::escalation::{EscalationId, EscalationItem, EscalationStatus};
use replyguard_core::domain::intent::{Intent, Priority};
use replyguard_core::domain::tenant::TenantId;

use super::{
    column, parse_enum, parse_optional_timestamp, parse_timestamp, EscalationRepository,
    RepositoryError,
};
use crate::DbPool;

const ESCALATION_COLUMNS: &str = "id, tenant_id, email_id, classification, priority, reason,
    status, assignee, resolution_note, created_at, updated_at, resolved_at";

pub struct SqlEscalationRepository {
    pool: DbPool,
}

impl SqlEscalationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_escalation(row: &sqlx::sqlite::SqliteRow) -> Result<EscalationItem, RepositoryError> {
    let classification: Option<String> = column(row, "classification")?;
    let priority: String = column(row, "priority")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let resolved_at: Option<String> = column(row, "resolved_at")?;

    Ok(EscalationItem {
        id: EscalationId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        email_id: EmailId(column(row, "email_id")?),
        classification: classification.as_deref().map(Intent::parse_lenient),
        priority: parse_enum("priority", &priority, Priority::parse)?,
        reason: column(row, "reason")?,
        status: parse_enum("status", &status, EscalationStatus::parse)?,
        assignee: column(row, "assignee")?,
        resolution_note: column(row, "resolution_note")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        resolved_at: parse_optional_timestamp("resolved_at", resolved_at)?,
    })
}

#[async_trait::async_trait]
impl EscalationRepository for SqlEscalationRepository {
    async fn find_by_id(
        &self,
        id: &EscalationId,
    ) -> Result<Option<EscalationItem>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalation_items WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_escalation).transpose()
    }

    async fn save(&self, item: EscalationItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO escalation_items (id, tenant_id, email_id, classification, priority,
                                           reason, status, assignee, resolution_note, created_at,
                                           updated_at, resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 priority = excluded.priority,
                 status = excluded.status,
                 assignee = excluded.assignee,
                 resolution_note = excluded.resolution_note,
                 updated_at = excluded.updated_at,
                 resolved_at = excluded.resolved_at",
        )
        .bind(&item.id.0)
        .bind(&item.tenant_id.0)
        .bind(&item.email_id.0)
        .bind(item.classification.map(|intent| intent.as_str()))
        .bind(item.priority.as_str())
        .bind(&item.reason)
        .bind(item.status.as_str())
        .bind(&item.assignee)
        .bind(&item.resolution_note)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .bind(item.resolved_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_open(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<EscalationItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalation_items
             WHERE tenant_id = ? AND status IN ('pending', 'in_progress')
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(&tenant_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_escalation).collect()
    }

    async fn list_for_email(
        &self,
        email_id: &EmailId,
    ) -> Result<Vec<EscalationItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ESCALATION_COLUMNS} FROM escalation_items
             WHERE email_id = ?
             ORDER BY created_at ASC"
        ))
        .bind(&email_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_escalation).collect()
    }
}
