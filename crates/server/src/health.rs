use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use replyguard_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    dispatch_configured: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub dispatch: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, dispatch_configured: bool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, dispatch_configured })
}

/// 503 only when the database is unreachable. A missing dispatcher still
/// accepts mail (every reply escalates), so it only marks the service degraded.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let dispatch = if state.dispatch_configured {
        HealthCheck { status: "ready", detail: "outbound webhook configured".to_string() }
    } else {
        HealthCheck {
            status: "degraded",
            detail: "dispatch.webhook_url is not set; replies escalate".to_string(),
        }
    };

    let database_ready = database.status == "ready";
    let status = if database_ready && dispatch.status == "ready" { "ready" } else { "degraded" };
    let status_code = if database_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse { status, database, dispatch, checked_at: Utc::now().to_rfc3339() }),
    )
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM emails").fetch_one(pool).await {
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} emails stored") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, extract::State, http::Request, http::StatusCode, Json};
    use replyguard_db::{connect_with_settings, migrations};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    #[tokio::test]
    async fn health_is_ready_with_schema_and_dispatcher() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let response = router(pool.clone(), true)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["database"]["detail"], "0 emails stored");

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_dispatcher_degrades_without_failing() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), dispatch_configured: false })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.dispatch.status, "degraded");

        pool.close().await;
    }

    #[tokio::test]
    async fn unreachable_database_is_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, dispatch_configured: true })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, "degraded");
    }
}
