use replyguard_core::domain::email::{Email, EmailId, EmailStatus, MessageId, ThreadId};
use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::tenant::TenantId;
use replyguard_core::domain::thread::ThreadPlacement;

use super::{
    column, parse_enum, parse_optional_timestamp, parse_timestamp, percent, EmailRepository,
    RepositoryError,
};
use crate::DbPool;

const EMAIL_COLUMNS: &str = "id, tenant_id, message_id, from_address, to_address, subject, body,
    status, classification, confidence, escalation_reason, thread_id, thread_position,
    is_thread_start, created_at, processed_at";

pub struct SqlEmailRepository {
    pool: DbPool,
}

impl SqlEmailRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_email(row: &sqlx::sqlite::SqliteRow) -> Result<Email, RepositoryError> {
    let status: String = column(row, "status")?;
    let classification: Option<String> = column(row, "classification")?;
    let confidence: Option<i64> = column(row, "confidence")?;
    let thread_id: Option<String> = column(row, "thread_id")?;
    let thread_position: Option<i64> = column(row, "thread_position")?;
    let created_at: String = column(row, "created_at")?;
    let processed_at: Option<String> = column(row, "processed_at")?;

    Ok(Email {
        id: EmailId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        message_id: MessageId(column(row, "message_id")?),
        from_address: column(row, "from_address")?,
        to_address: column(row, "to_address")?,
        subject: column(row, "subject")?,
        body: column(row, "body")?,
        status: parse_enum("status", &status, EmailStatus::parse)?,
        classification: classification.as_deref().map(Intent::parse_lenient),
        confidence: confidence.map(|value| percent("confidence", value)).transpose()?,
        escalation_reason: column(row, "escalation_reason")?,
        thread_id: thread_id.map(ThreadId),
        thread_position: thread_position
            .map(|value| {
                u32::try_from(value)
                    .map_err(|e| RepositoryError::Decode(format!("thread_position: {e}")))
            })
            .transpose()?,
        is_thread_start: column(row, "is_thread_start")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        processed_at: parse_optional_timestamp("processed_at", processed_at)?,
    })
}

#[async_trait::async_trait]
impl EmailRepository for SqlEmailRepository {
    async fn insert(&self, email: Email) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO emails (id, tenant_id, message_id, from_address, to_address, subject, body,
                                 status, classification, confidence, escalation_reason, thread_id,
                                 thread_position, is_thread_start, created_at, processed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&email.id.0)
        .bind(&email.tenant_id.0)
        .bind(&email.message_id.0)
        .bind(&email.from_address)
        .bind(&email.to_address)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.status.as_str())
        .bind(email.classification.map(|intent| intent.as_str()))
        .bind(email.confidence.map(i64::from))
        .bind(&email.escalation_reason)
        .bind(email.thread_id.as_ref().map(|id| id.0.as_str()))
        .bind(email.thread_position.map(i64::from))
        .bind(email.is_thread_start)
        .bind(email.created_at.to_rfc3339())
        .bind(email.processed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Duplicate(format!(
                    "email {} for tenant {}",
                    email.message_id.0, email.tenant_id.0
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find_by_id(&self, id: &EmailId) -> Result<Option<Email>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_email).transpose()
    }

    async fn find_by_message_id(
        &self,
        tenant_id: &TenantId,
        message_id: &MessageId,
    ) -> Result<Option<Email>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails WHERE tenant_id = ? AND message_id = ?"
        ))
        .bind(&tenant_id.0)
        .bind(&message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_email).transpose()
    }

    async fn list_between(
        &self,
        tenant_id: &TenantId,
        first: &str,
        second: &str,
        limit: u32,
    ) -> Result<Vec<Email>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE tenant_id = ?
               AND ((from_address = ? AND to_address = ?) OR (from_address = ? AND to_address = ?))
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(&tenant_id.0)
        .bind(first)
        .bind(second)
        .bind(second)
        .bind(first)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_email).collect()
    }

    async fn list_thread(
        &self,
        tenant_id: &TenantId,
        thread_id: &ThreadId,
    ) -> Result<Vec<Email>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMAIL_COLUMNS} FROM emails
             WHERE tenant_id = ? AND thread_id = ?
             ORDER BY thread_position ASC, created_at ASC"
        ))
        .bind(&tenant_id.0)
        .bind(&thread_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_email).collect()
    }

    async fn update_thread(
        &self,
        id: &EmailId,
        placement: &ThreadPlacement,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE emails SET thread_id = ?, thread_position = ?, is_thread_start = ? WHERE id = ?",
        )
        .bind(&placement.thread_id.0)
        .bind(i64::from(placement.position))
        .bind(placement.is_thread_start)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("email {}", id.0)));
        }
        Ok(())
    }

    async fn update_outcome(&self, email: &Email) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE emails
             SET status = ?, classification = ?, confidence = ?, escalation_reason = ?,
                 processed_at = ?
             WHERE id = ?",
        )
        .bind(email.status.as_str())
        .bind(email.classification.map(|intent| intent.as_str()))
        .bind(email.confidence.map(i64::from))
        .bind(&email.escalation_reason)
        .bind(email.processed_at.map(|dt| dt.to_rfc3339()))
        .bind(&email.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("email {}", email.id.0)));
        }
        Ok(())
    }
}
