use replyguard_core::domain::approval::{ApprovalAction, ApprovalId, ApprovalItem, ApprovalStatus};
use replyguard_core::domain::email::EmailId;
use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::rule::RuleId;
use replyguard_core::domain::tenant::TenantId;

use super::{
    column, parse_enum, parse_optional_timestamp, parse_timestamp, percent, ApprovalRepository,
    RepositoryError,
};
use crate::DbPool;

const APPROVAL_COLUMNS: &str = "id, tenant_id, email_id, rule_id, classification, confidence,
    proposed_response, action, status, reviewer, reviewer_feedback, final_response, created_at,
    updated_at, decided_at";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_approval(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalItem, RepositoryError> {
    let classification: String = column(row, "classification")?;
    let confidence: i64 = column(row, "confidence")?;
    let status: String = column(row, "status")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;
    let decided_at: Option<String> = column(row, "decided_at")?;
    let action: Option<String> = column(row, "action")?;
    let action = action
        .map(|json| serde_json::from_str::<ApprovalAction>(&json))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("action: {error}")))?;

    Ok(ApprovalItem {
        id: ApprovalId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        email_id: EmailId(column(row, "email_id")?),
        rule_id: RuleId(column(row, "rule_id")?),
        classification: parse_enum("classification", &classification, Intent::parse)?,
        confidence: percent("confidence", confidence)?,
        proposed_response: column(row, "proposed_response")?,
        action,
        status: parse_enum("status", &status, ApprovalStatus::parse)?,
        reviewer: column(row, "reviewer")?,
        reviewer_feedback: column(row, "reviewer_feedback")?,
        final_response: column(row, "final_response")?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        decided_at: parse_optional_timestamp("decided_at", decided_at)?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<ApprovalItem>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM approval_items WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_approval).transpose()
    }

    async fn save(&self, item: ApprovalItem) -> Result<(), RepositoryError> {
        let action = item
            .action
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| RepositoryError::Decode(format!("action: {error}")))?;

        sqlx::query(
            "INSERT INTO approval_items (id, tenant_id, email_id, rule_id, classification,
                                         confidence, proposed_response, action, status,
                                         reviewer, reviewer_feedback, final_response,
                                         created_at, updated_at, decided_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 proposed_response = excluded.proposed_response,
                 action = excluded.action,
                 status = excluded.status,
                 reviewer = excluded.reviewer,
                 reviewer_feedback = excluded.reviewer_feedback,
                 final_response = excluded.final_response,
                 updated_at = excluded.updated_at,
                 decided_at = excluded.decided_at",
        )
        .bind(&item.id.0)
        .bind(&item.tenant_id.0)
        .bind(&item.email_id.0)
        .bind(&item.rule_id.0)
        .bind(item.classification.as_str())
        .bind(i64::from(item.confidence))
        .bind(&item.proposed_response)
        .bind(action)
        .bind(item.status.as_str())
        .bind(&item.reviewer)
        .bind(&item.reviewer_feedback)
        .bind(&item.final_response)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .bind(item.decided_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_pending(
        &self,
        id: &ApprovalId,
        next: ApprovalStatus,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE approval_items SET status = ? WHERE id = ? AND status = 'pending'")
                .bind(next.as_str())
                .bind(&id.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_pending(
        &self,
        tenant_id: &TenantId,
        limit: u32,
    ) -> Result<Vec<ApprovalItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approval_items
             WHERE tenant_id = ? AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(&tenant_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use replyguard_core::domain::approval::{
        ApprovalAction, ApprovalId, ApprovalItem, ApprovalStatus,
    };
    use replyguard_core::domain::email::{Email, EmailId, InboundEmail};
    use replyguard_core::domain::intent::Intent;
    use replyguard_core::domain::rule::RuleId;
    use replyguard_core::domain::tenant::TenantId;

    use super::SqlApprovalRepository;
    use crate::repositories::{ApprovalRepository, EmailRepository, SqlEmailRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    /// Insert a parent email so that FK constraints are satisfied.
    async fn insert_email(pool: &sqlx::SqlitePool, message_id: &str) -> EmailId {
        let email = Email::received(
            TenantId("tenant-1".to_string()),
            InboundEmail {
                from_email: "c@example.com".to_string(),
                to_email: "help@shop.io".to_string(),
                subject: "Refund please".to_string(),
                body: "I was overcharged on order #4821".to_string(),
                message_id: message_id.to_string(),
            },
            Utc::now(),
        );
        let id = email.id.clone();
        SqlEmailRepository::new(pool.clone()).insert(email).await.expect("insert parent email");
        id
    }

    fn sample(id: &str, email_id: EmailId, minutes_ago: i64) -> ApprovalItem {
        let mut item = ApprovalItem::pending(
            TenantId("tenant-1".to_string()),
            email_id,
            RuleId("rule-refund".to_string()),
            Intent::PromoRefund,
            74,
            "We've issued a refund of $5.00 for order #4821.",
            Utc::now() - Duration::minutes(minutes_ago),
        );
        item.id = ApprovalId(id.to_string());
        item
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let pool = setup().await;
        let email_id = insert_email(&pool, "msg-1").await;
        let repo = SqlApprovalRepository::new(pool);
        let approval = sample("APR-001", email_id, 0);

        repo.save(approval.clone()).await.expect("save");
        let found = repo
            .find_by_id(&ApprovalId("APR-001".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found.email_id, approval.email_id);
        assert_eq!(found.classification, Intent::PromoRefund);
        assert_eq!(found.confidence, 74);
        assert_eq!(found.status, ApprovalStatus::Pending);
    }

    #[tokio::test]
    async fn decisions_are_upserted_and_leave_the_pending_list() {
        let pool = setup().await;
        let first = insert_email(&pool, "msg-1").await;
        let second = insert_email(&pool, "msg-2").await;
        let repo = SqlApprovalRepository::new(pool);

        repo.save(sample("APR-001", first, 20)).await.expect("save 1");
        let mut decided = sample("APR-002", second, 10);
        repo.save(decided.clone()).await.expect("save 2");

        decided.approve("ops@shop.io", Utc::now()).expect("approve");
        repo.save(decided).await.expect("upsert");

        let pending =
            repo.list_pending(&TenantId("tenant-1".to_string()), 10).await.expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.0, "APR-001");

        let approved = repo
            .find_by_id(&ApprovalId("APR-002".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.reviewer.as_deref(), Some("ops@shop.io"));
        assert!(approved.final_response.is_some());
    }

    #[tokio::test]
    async fn only_one_claim_on_a_pending_item_succeeds() {
        let pool = setup().await;
        let email_id = insert_email(&pool, "msg-1").await;
        let repo = SqlApprovalRepository::new(pool);
        repo.save(sample("APR-001", email_id, 0)).await.expect("save");
        let id = ApprovalId("APR-001".to_string());

        assert!(repo.claim_pending(&id, ApprovalStatus::Approved).await.expect("first claim"));
        assert!(!repo.claim_pending(&id, ApprovalStatus::Rejected).await.expect("second claim"));
        assert!(!repo
            .claim_pending(&ApprovalId("missing".to_string()), ApprovalStatus::Approved)
            .await
            .expect("unknown id"));

        let claimed = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(claimed.status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn pending_workflow_survives_storage_and_can_be_dropped() {
        let pool = setup().await;
        let email_id = insert_email(&pool, "msg-1").await;
        let repo = SqlApprovalRepository::new(pool);
        let item = sample("APR-001", email_id, 0)
            .with_action(Some(ApprovalAction::CancelOrder { order_number: "4821".to_string() }));
        repo.save(item.clone()).await.expect("save");

        let id = ApprovalId("APR-001".to_string());
        let found = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(found.action, Some(ApprovalAction::CancelOrder { order_number: "4821".to_string() }));

        let mut ran = found;
        ran.action = None;
        ran.proposed_response = "Order #4821 has been cancelled.".to_string();
        repo.save(ran).await.expect("upsert");

        let after = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(after.action, None);
        assert_eq!(after.proposed_response, "Order #4821 has been cancelled.");
        assert_eq!(after.status, ApprovalStatus::Pending);
    }
}
