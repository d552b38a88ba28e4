//! HTTP surface for tasks: CRUD plus the completion transition.
//!
//! Handlers validate raw input, hand the rest to the lifecycle in
//! tasks.rs, and translate its rejections into the JSON bodies clients
//! see. The acting user arrives via the auth middleware's extension.

use crate::auth::{SharedState, User};
use crate::query::{self, TaskFilters};
use crate::tasks::{
    self, NewTask, Task, TaskError, TaskPatch, TaskStatus, MAX_PRIORITY, MAX_TITLE_CHARS,
    MIN_PRIORITY,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

// The wording for edits of a completed task differs per endpoint.
const CHANGE_COMPLETED: &str = "You can't change a task that has already been completed";
const TASK_ALREADY_DONE: &str = "Task already done!";
const DELETE_COMPLETED: &str = "You cannot delete a completed task.";

// ── Response helpers ───────────────────────────────────────────

pub(crate) fn reject(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

pub(crate) fn validation_failed(errors: Value) -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "Validation failed", "errors": errors })),
    )
}

/// Logs the real failure and answers with a body that doesn't leak it.
pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %err, "request failed");
    reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn rejection(err: TaskError, already_completed: &str) -> (StatusCode, Json<Value>) {
    match err {
        TaskError::NotFound => reject(StatusCode::NOT_FOUND, "Task not found"),
        TaskError::NotOwner => reject(StatusCode::FORBIDDEN, "You do not own this task."),
        TaskError::AlreadyCompleted => reject(StatusCode::BAD_REQUEST, already_completed),
        TaskError::IncompleteChildren => reject(
            StatusCode::BAD_REQUEST,
            "Cannot complete task: Some child tasks are not done!",
        ),
        TaskError::Store(e) => internal_error(e),
    }
}

/// Route ids arrive as text. Anything that doesn't parse as an id gets
/// the same answer as an id with no task behind it.
fn parse_task_id(raw: &str) -> Result<u64, (StatusCode, Json<Value>)> {
    raw.parse()
        .map_err(|_| reject(StatusCode::NOT_FOUND, "Task not found"))
}

// ── Request payloads ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTasksParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sort_by: Option<String>,
}

/// Title and priority rules shared by create and update. Collects every
/// field failure so the response names them all at once.
fn validate_task_fields(
    title: Option<String>,
    priority: Option<i64>,
) -> Result<(String, Option<u8>), (StatusCode, Json<Value>)> {
    let mut errors = serde_json::Map::new();

    let title = title.unwrap_or_default();
    if title.is_empty() {
        errors.insert("title".into(), json!(["The title field is required."]));
    } else if title.chars().count() > MAX_TITLE_CHARS {
        errors.insert(
            "title".into(),
            json!(["The title may not be greater than 255 characters."]),
        );
    }

    let priority = match priority {
        Some(p) if p < MIN_PRIORITY as i64 || p > MAX_PRIORITY as i64 => {
            errors.insert(
                "priority".into(),
                json!(["The priority must be between 1 and 5."]),
            );
            None
        }
        Some(p) => Some(p as u8),
        None => None,
    };

    if errors.is_empty() {
        Ok((title, priority))
    } else {
        Err(validation_failed(Value::Object(errors)))
    }
}

// ── Handlers ───────────────────────────────────────────────────

// GET /api/tasks
pub async fn list_tasks(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<Vec<Task>>, (StatusCode, Json<Value>)> {
    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match TaskStatus::parse(raw) {
            Some(s) => Some(s),
            None => {
                return Err(validation_failed(json!({
                    "status": ["The selected status is invalid."],
                })))
            }
        },
    };

    let filters = TaskFilters {
        status,
        priority: params.priority,
        title: params.title,
        description: params.description,
    };
    let criteria = params
        .sort_by
        .as_deref()
        .map(query::parse_sort_by)
        .unwrap_or_default();

    let tasks = query::run(&state.store, user.id, &filters, &criteria).map_err(internal_error)?;
    Ok(Json(tasks))
}

// POST /api/tasks
pub async fn create_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, Json<Value>)> {
    let (title, priority) = validate_task_fields(payload.title, payload.priority)?;

    let new = NewTask {
        parent_id: payload.parent_id,
        title,
        description: payload.description,
        priority,
    };
    let task = tasks::create(&state.store, user.id, new, Utc::now())
        .map_err(|e| rejection(e, CHANGE_COMPLETED))?;

    Ok((StatusCode::CREATED, Json(task)))
}

// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, Json<Value>)> {
    let id = parse_task_id(&id)?;
    let task =
        tasks::fetch(&state.store, user.id, id).map_err(|e| rejection(e, CHANGE_COMPLETED))?;
    Ok(Json(task))
}

// PUT /api/tasks/:id
pub async fn update_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, Json<Value>)> {
    let (title, priority) = validate_task_fields(payload.title, payload.priority)?;
    let id = parse_task_id(&id)?;

    let patch = TaskPatch {
        title,
        description: payload.description,
        priority,
    };
    let task = tasks::update(&state.store, user.id, id, patch)
        .map_err(|e| rejection(e, CHANGE_COMPLETED))?;
    Ok(Json(task))
}

// PATCH /api/tasks/:id/complete
pub async fn complete_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, Json<Value>)> {
    let id = parse_task_id(&id)?;
    let task = tasks::complete(&state.store, user.id, id, Utc::now())
        .map_err(|e| rejection(e, TASK_ALREADY_DONE))?;
    Ok(Json(task))
}

// DELETE /api/tasks/:id
pub async fn delete_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let id = parse_task_id(&id)?;
    tasks::delete(&state.store, user.id, id).map_err(|e| rejection(e, DELETE_COMPLETED))?;
    Ok(Json(json!({ "message": "The task was successfully deleted." })))
}

// ── Tests ──────────────────────────────────────────────────────
