use chrono::{DateTime, Utc};

use replyguard_core::domain::intent::Intent;
use replyguard_core::domain::rule::{AutomationRule, ResponseStrategy, RuleConfig, RuleId};
use replyguard_core::domain::tenant::TenantId;

use super::{
    column, parse_enum, parse_optional_timestamp, parse_timestamp, RepositoryError, RuleRepository,
};
use crate::DbPool;

const RULE_COLUMNS: &str = "id, tenant_id, name, classification, active, requires_approval,
    strategy, config_json, trigger_count, last_triggered_at, created_at, updated_at";

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<AutomationRule, RepositoryError> {
    let classification: String = column(row, "classification")?;
    let strategy: String = column(row, "strategy")?;
    let config_json: String = column(row, "config_json")?;
    let trigger_count: i64 = column(row, "trigger_count")?;
    let last_triggered_at: Option<String> = column(row, "last_triggered_at")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    let config: RuleConfig = serde_json::from_str(&config_json)
        .map_err(|e| RepositoryError::Decode(format!("config_json: {e}")))?;

    Ok(AutomationRule {
        id: RuleId(column(row, "id")?),
        tenant_id: TenantId(column(row, "tenant_id")?),
        name: column(row, "name")?,
        classification: parse_enum("classification", &classification, Intent::parse)?,
        active: column(row, "active")?,
        requires_approval: column(row, "requires_approval")?,
        strategy: parse_enum("strategy", &strategy, ResponseStrategy::parse)?,
        config,
        trigger_count: u32::try_from(trigger_count)
            .map_err(|e| RepositoryError::Decode(format!("trigger_count: {e}")))?,
        last_triggered_at: parse_optional_timestamp("last_triggered_at", last_triggered_at)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn list_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<AutomationRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM automation_rules
             WHERE tenant_id = ?
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    async fn find_by_id(&self, id: &RuleId) -> Result<Option<AutomationRule>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {RULE_COLUMNS} FROM automation_rules WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_rule).transpose()
    }

    async fn save(&self, rule: AutomationRule) -> Result<(), RepositoryError> {
        let config_json = serde_json::to_string(&rule.config)
            .map_err(|e| RepositoryError::Decode(format!("config_json: {e}")))?;

        sqlx::query(
            "INSERT INTO automation_rules (id, tenant_id, name, classification, active,
                                           requires_approval, strategy, config_json, trigger_count,
                                           last_triggered_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 classification = excluded.classification,
                 active = excluded.active,
                 requires_approval = excluded.requires_approval,
                 strategy = excluded.strategy,
                 config_json = excluded.config_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.tenant_id.0)
        .bind(&rule.name)
        .bind(rule.classification.as_str())
        .bind(rule.active)
        .bind(rule.requires_approval)
        .bind(rule.strategy.as_str())
        .bind(config_json)
        .bind(i64::from(rule.trigger_count))
        .bind(rule.last_triggered_at.map(|dt| dt.to_rfc3339()))
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_trigger(&self, id: &RuleId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE automation_rules
             SET trigger_count = trigger_count + 1, last_triggered_at = ?
             WHERE id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("automation rule {}", id.0)));
        }
        Ok(())
    }
}
