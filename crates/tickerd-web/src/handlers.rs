//! Request handlers: submission, polling, cancellation, config.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Form, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use tickerd_core::domain::{TaskId, TaskRecord, TaskState, TaskSummary};
use tickerd_core::envfile::is_valid_schedule_time;
use tickerd_core::guard::is_loopback;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

const SERVICE_NAME: &str = "tickerd-web";
const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
    pub service: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        service: SERVICE_NAME,
    })
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_ids: Vec<TaskId>,
}

/// GET /analysis?code=...
///
/// `code` may carry one ticker or a comma/whitespace-delimited batch; the
/// gateway normalizes and admits it atomically.
pub async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
) -> AppResult<Json<SubmitResponse>> {
    let code = params
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::bad_request("missing required parameter: code"))?;

    let task_ids = state.gateway.submit_tickers(code).await?;
    Ok(Json(SubmitResponse { task_ids }))
}

/// GET /market-review
pub async fn market_review(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let task_id = state.gateway.submit_market_review().await?;
    Ok(Json(json!({ "task_id": task_id })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<TaskSummary>,
}

/// GET /tasks?limit=
pub async fn tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<TasksResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Json(TasksResponse {
        tasks: state.store.list(limit).await,
    })
}

#[derive(Debug, Deserialize)]
pub struct TaskParams {
    pub id: String,
}

/// GET /task?id=
pub async fn task(
    State(state): State<AppState>,
    Query(params): Query<TaskParams>,
) -> AppResult<Json<TaskRecord>> {
    let id: TaskId = params
        .id
        .parse()
        .map_err(|_| AppError::bad_request(format!("malformed task id: {}", params.id)))?;
    let record = state
        .store
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("unknown task: {id}")))?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: TaskId,
    pub state: TaskState,
}

/// POST /cancel?id=
pub async fn cancel(
    State(state): State<AppState>,
    Query(params): Query<TaskParams>,
) -> AppResult<Json<CancelResponse>> {
    let id: TaskId = params
        .id
        .parse()
        .map_err(|_| AppError::bad_request(format!("malformed task id: {}", params.id)))?;
    let new_state = state.store.cancel(id).await?;
    Ok(Json(CancelResponse {
        task_id: id,
        state: new_state,
    }))
}

fn require_loopback(addr: SocketAddr) -> AppResult<()> {
    if is_loopback(addr.ip()) {
        Ok(())
    } else {
        tracing::warn!(peer = %addr, "rejected config mutation from non-local origin");
        Err(AppError::forbidden(
            "config endpoints are restricted to the local machine (127.0.0.1 / ::1)",
        ))
    }
}

/// GET /env (loopback only)
pub async fn env_show(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> AppResult<String> {
    require_loopback(addr)?;
    Ok(state.env.read_text()?)
}

/// POST /env/update (loopback only)
///
/// Body is the full key-value blob. The previous version is backed up
/// before the atomic replace; nothing is written on a guard rejection.
pub async fn env_update(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: String,
) -> AppResult<Json<Value>> {
    require_loopback(addr)?;
    let backup = state.env.save_text(&body)?;
    Ok(Json(json!({ "saved": true, "backup": backup })))
}

/// GET /stocks (loopback only)
pub async fn stocks_show(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> AppResult<Json<Value>> {
    require_loopback(addr)?;
    let stock_list = state.env.get_stock_list()?;
    Ok(Json(json!({ "stock_list": stock_list })))
}

#[derive(Debug, Deserialize)]
pub struct StockListForm {
    pub stocks: String,
}

/// POST /stocks/update (loopback only)
///
/// Accepts a comma or newline separated list; the normalized form is
/// persisted under `STOCK_LIST` and echoed back.
pub async fn stocks_update(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<StockListForm>,
) -> AppResult<Json<Value>> {
    require_loopback(addr)?;
    let stock_list = state.env.set_stock_list(&form.stocks)?;
    Ok(Json(json!({ "saved": true, "stock_list": stock_list })))
}

#[derive(Debug, Deserialize)]
pub struct CommonConfigForm {
    #[serde(default)]
    pub schedule_enabled: bool,
    pub schedule_time: String,
    #[serde(default = "default_true")]
    pub market_review_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// POST /common/update (loopback only)
///
/// Scheduling subset of the config; other keys and comments are preserved.
pub async fn common_update(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(form): Form<CommonConfigForm>,
) -> AppResult<Json<Value>> {
    require_loopback(addr)?;

    if !is_valid_schedule_time(&form.schedule_time) {
        return Err(AppError::bad_request(
            "SCHEDULE_TIME must be HH:MM (24-hour clock)",
        ));
    }

    state.env.update_values(&[
        (
            "SCHEDULE_ENABLED".to_string(),
            form.schedule_enabled.to_string(),
        ),
        ("SCHEDULE_TIME".to_string(), form.schedule_time.clone()),
        (
            "MARKET_REVIEW_ENABLED".to_string(),
            form.market_review_enabled.to_string(),
        ),
    ])?;

    Ok(Json(json!({ "saved": true })))
}
