//! JSON API: email ingestion plus the approval and escalation desks.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use replyguard_agent::{DecisionRuntime, DeskError, ProcessReport, Rejection, RuntimeError};
use replyguard_core::domain::approval::{ApprovalId, ApprovalItem};
use replyguard_core::domain::email::InboundEmail;
use replyguard_core::domain::escalation::{EscalationId, EscalationItem};
use replyguard_core::domain::tenant::TenantId;
use serde::{Deserialize, Serialize};
use tracing::warn;

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<DecisionRuntime>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    reviewer: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    reviewer: String,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    reviewer: String,
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    assignee: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    actor: String,
    #[serde(default)]
    note: Option<String>,
}

pub fn router(runtime: Arc<DecisionRuntime>) -> Router {
    Router::new()
        .route("/api/v1/tenants/{tenant_id}/emails", post(receive_email))
        .route("/api/v1/tenants/{tenant_id}/approvals", get(list_approvals))
        .route("/api/v1/tenants/{tenant_id}/escalations", get(list_escalations))
        .route("/api/v1/approvals/{id}/approve", post(approve))
        .route("/api/v1/approvals/{id}/reject", post(reject))
        .route("/api/v1/approvals/{id}/edit", post(edit_and_send))
        .route("/api/v1/escalations/{id}/start", post(start_escalation))
        .route("/api/v1/escalations/{id}/resolve", post(resolve_escalation))
        .with_state(ApiState { runtime })
}

async fn receive_email(
    State(state): State<ApiState>,
    Path(tenant_id): Path<String>,
    Json(inbound): Json<InboundEmail>,
) -> ApiResult<ProcessReport> {
    let tenant_id = tenant(tenant_id)?;
    if inbound.message_id.trim().is_empty() {
        return Err(bad_request("messageId is required"));
    }
    if inbound.from_email.trim().is_empty() {
        return Err(bad_request("fromEmail is required"));
    }

    state.runtime.process(tenant_id, inbound).await.map(Json).map_err(runtime_error)
}

async fn list_approvals(
    State(state): State<ApiState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<ApprovalItem>> {
    let tenant_id = tenant(tenant_id)?;
    state
        .runtime
        .list_pending_approvals(&tenant_id, query.limit())
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn list_escalations(
    State(state): State<ApiState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<EscalationItem>> {
    let tenant_id = tenant(tenant_id)?;
    state.runtime.list_open_escalations(&tenant_id, query.limit()).await.map(Json).map_err(desk_error)
}

async fn approve(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> ApiResult<ApprovalItem> {
    let reviewer = required(&body.reviewer, "reviewer")?;
    state.runtime.approve(&ApprovalId(id), reviewer).await.map(Json).map_err(desk_error)
}

async fn reject(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<RejectRequest>,
) -> ApiResult<Rejection> {
    let reviewer = required(&body.reviewer, "reviewer")?;
    state.runtime.reject(&ApprovalId(id), reviewer, body.feedback).await.map(Json).map_err(desk_error)
}

async fn edit_and_send(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<EditRequest>,
) -> ApiResult<ApprovalItem> {
    let reviewer = required(&body.reviewer, "reviewer")?;
    state
        .runtime
        .edit_and_send(&ApprovalId(id), reviewer, &body.response)
        .await
        .map(Json)
        .map_err(desk_error)
}

async fn start_escalation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<StartRequest>,
) -> ApiResult<EscalationItem> {
    state.runtime.start_escalation(&EscalationId(id), &body.assignee).await.map(Json).map_err(desk_error)
}

async fn resolve_escalation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> ApiResult<EscalationItem> {
    let actor = required(&body.actor, "actor")?;
    state
        .runtime
        .resolve_escalation(&EscalationId(id), actor, body.note)
        .await
        .map(Json)
        .map_err(desk_error)
}

impl ListQuery {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }
}

fn tenant(raw: String) -> Result<TenantId, (StatusCode, Json<ApiError>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(bad_request("tenant id is required"));
    }
    Ok(TenantId(trimmed.to_string()))
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, (StatusCode, Json<ApiError>)> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(bad_request(&format!("{field} is required")));
    }
    Ok(trimmed)
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string() }))
}

fn runtime_error(error: RuntimeError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        RuntimeError::Duplicate { .. } => StatusCode::CONFLICT,
        RuntimeError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
        RuntimeError::Flow(_) | RuntimeError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    respond(status, error.to_string())
}

fn desk_error(error: DeskError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        DeskError::NotFound { .. } => StatusCode::NOT_FOUND,
        DeskError::Domain(_) | DeskError::AlreadyDecided(_) => StatusCode::CONFLICT,
        DeskError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DeskError::Blocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DeskError::DispatchFailed(_) | DeskError::Workflow(_) => StatusCode::BAD_GATEWAY,
        DeskError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    respond(status, error.to_string())
}

fn respond(status: StatusCode, message: String) -> (StatusCode, Json<ApiError>) {
    if status.is_server_error() {
        warn!(event_name = "api.request.failed", status = status.as_u16(), error = %message, "request failed");
    }
    (status, Json(ApiError { error: message }))
}
