use std::sync::Arc;
use std::time::Duration;

use replyguard_agent::llm::HttpLlmClient;
use replyguard_agent::sentiment::{HttpSentimentClient, SentimentAdapter, SentimentClient};
use replyguard_agent::tools::Collaborators;
use replyguard_agent::{DecisionRuntime, Repositories, RuntimeError, RuntimeOptions};
use replyguard_core::config::{AppConfig, ConfigError};
use replyguard_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatch::WebhookDispatcher;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<DecisionRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration setup failed: {0:#}")]
    Integration(anyhow::Error),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let runtime = build_runtime(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        llm_provider = config.llm.provider.as_str(),
        sentiment_enabled = config.sentiment.enabled,
        dispatch_configured = config.dispatch.webhook_url.is_some(),
        "decision runtime initialized"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

fn build_runtime(config: &AppConfig, db_pool: DbPool) -> Result<DecisionRuntime, BootstrapError> {
    let llm = HttpLlmClient::from_config(&config.llm).map_err(BootstrapError::Integration)?;

    let sentiment_client = HttpSentimentClient::from_config(&config.sentiment)
        .map_err(BootstrapError::Integration)?
        .map(|client| Arc::new(client) as Arc<dyn SentimentClient>);
    let sentiment = SentimentAdapter::new(
        sentiment_client,
        config.thresholds,
        Duration::from_secs(config.sentiment.timeout_secs),
    );

    let mut collaborators = Collaborators::unconfigured();
    match WebhookDispatcher::from_config(&config.dispatch).map_err(BootstrapError::Integration)? {
        Some(dispatcher) => collaborators.dispatcher = Arc::new(dispatcher),
        None => warn!(
            event_name = "system.bootstrap.dispatch_unconfigured",
            "dispatch.webhook_url is not set; every reply will escalate as failed to send"
        ),
    }

    let options = RuntimeOptions { thresholds: config.thresholds, ..RuntimeOptions::default() };
    Ok(DecisionRuntime::new(
        Repositories::sqlite(db_pool),
        collaborators,
        Arc::new(llm),
        sentiment,
        options,
    )?)
}

#[cfg(test)]
mod tests {
    use replyguard_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use replyguard_core::domain::tenant::TenantId;

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_dispatch_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                dispatch_webhook_url: Some("mail.example.com/send".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("invalid webhook must fail").to_string();
        assert!(message.contains("dispatch.webhook_url"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_runtime() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('emails', 'automation_rules', 'approval_items', 'escalation_items')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4);

        let pending = app
            .runtime
            .list_pending_approvals(&TenantId("tenant-1".to_string()), 10)
            .await
            .expect("listing works against sqlite");
        assert!(pending.is_empty());

        app.db_pool.close().await;
    }
}
