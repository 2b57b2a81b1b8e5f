use chrono::Utc;

use replyguard_core::domain::tenant::{EmpathyLevel, TenantId, TenantSettings};

use super::{column, parse_enum, RepositoryError, TenantSettingsRepository};
use crate::DbPool;

pub struct SqlTenantSettingsRepository {
    pool: DbPool,
}

impl SqlTenantSettingsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_list(column_name: &str, raw: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(format!("{column_name}: {e}")))
}

fn encode_list(column_name: &str, values: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(values)
        .map_err(|e| RepositoryError::Decode(format!("{column_name}: {e}")))
}

fn row_to_settings(row: &sqlx::sqlite::SqliteRow) -> Result<TenantSettings, RepositoryError> {
    let empathy_level: String = column(row, "empathy_level")?;
    let knowledge_json: String = column(row, "knowledge_json")?;
    let competitors_json: String = column(row, "competitors_json")?;

    Ok(TenantSettings {
        tenant_id: TenantId(column(row, "tenant_id")?),
        company_name: column(row, "company_name")?,
        empathy_level: parse_enum("empathy_level", &empathy_level, EmpathyLevel::parse)?,
        support_signature: column(row, "support_signature")?,
        knowledge_snippets: decode_list("knowledge_json", &knowledge_json)?,
        competitors: decode_list("competitors_json", &competitors_json)?,
    })
}

#[async_trait::async_trait]
impl TenantSettingsRepository for SqlTenantSettingsRepository {
    async fn find(&self, tenant_id: &TenantId) -> Result<Option<TenantSettings>, RepositoryError> {
        let row = sqlx::query(
            "SELECT tenant_id, company_name, empathy_level, support_signature, knowledge_json,
                    competitors_json
             FROM tenant_settings WHERE tenant_id = ?",
        )
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_settings).transpose()
    }

    async fn save(&self, settings: TenantSettings) -> Result<(), RepositoryError> {
        let knowledge_json = encode_list("knowledge_json", &settings.knowledge_snippets)?;
        let competitors_json = encode_list("competitors_json", &settings.competitors)?;

        sqlx::query(
            "INSERT INTO tenant_settings (tenant_id, company_name, empathy_level, support_signature,
                                          knowledge_json, competitors_json, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET
                 company_name = excluded.company_name,
                 empathy_level = excluded.empathy_level,
                 support_signature = excluded.support_signature,
                 knowledge_json = excluded.knowledge_json,
                 competitors_json = excluded.competitors_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&settings.tenant_id.0)
        .bind(&settings.company_name)
        .bind(settings.empathy_level.as_str())
        .bind(&settings.support_signature)
        .bind(knowledge_json)
        .bind(competitors_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
