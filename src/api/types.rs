//! API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::ToolInfo;

/// Query string of `POST /run`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunParams {
    /// The task description in plain language
    pub task: Option<String>,
}

/// JSON body accepted by `POST /run` when no `task` query parameter is given.
#[derive(Debug, Clone, Deserialize)]
pub struct RunBody {
    pub task: String,
}

/// Query string of `GET /read`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadParams {
    pub path: Option<String>,
}

/// Response after a task ran to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    /// Always `"success"`
    pub status: String,

    /// Identifier of the task that ran
    pub task: String,

    pub message: String,

    /// What the task reported, if anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Correlates the response with the server logs
    pub run_id: Uuid,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Registered tasks in registration order.
#[derive(Debug, Clone, Serialize)]
pub struct TasksResponse {
    pub tasks: Vec<ToolInfo>,
}
