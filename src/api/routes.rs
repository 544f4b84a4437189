//! Router and request handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::types::{HealthResponse, ReadParams, RunBody, RunParams, RunResponse, TasksResponse};
use crate::dispatch::Dispatcher;

/// Shared state of every handler.
pub struct AppState {
    pub dispatcher: Dispatcher,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/run", post(run_task))
        .route("/read", get(read_file))
        .route("/health", get(health))
        .route("/tasks", get(list_tasks))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// `POST /run` - classify the task text and execute the selected task.
async fn run_task(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<RunResponse>> {
    let text = task_text(params, &headers, &body)?;

    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id);
    let outcome = state
        .dispatcher
        .run(&text)
        .instrument(span)
        .await?;

    Ok(Json(RunResponse {
        status: "success".to_string(),
        task: outcome.task,
        message: outcome.message,
        output: outcome.output,
        run_id,
    }))
}

/// The query parameter wins; otherwise a JSON `{"task": ...}` body or plain text.
fn task_text(params: RunParams, headers: &HeaderMap, body: &[u8]) -> ApiResult<String> {
    if let Some(task) = params.task {
        return Ok(task);
    }
    if body.is_empty() {
        return Ok(String::new());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        let parsed: RunBody = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        Ok(parsed.task)
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::BadRequest("Task body is not valid UTF-8".to_string()))
    }
}

/// `GET /read` - raw contents of a file under the data root.
async fn read_file(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadParams>,
) -> ApiResult<Response> {
    let raw = params
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing `path` query parameter".to_string()))?;
    let path = state
        .dispatcher
        .data_root()
        .resolve(&raw)
        .map_err(|e| ApiError::Forbidden(e.to_string()))?;

    let contents = match tokio::fs::read(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let content_type = if std::str::from_utf8(&contents).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], contents).into_response())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<TasksResponse> {
    Json(TasksResponse {
        tasks: state.dispatcher.registry().list_tools(),
    })
}
