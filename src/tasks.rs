//! Tasks and the rules for changing them.
//!
//! Every mutation goes through the functions here. They check ownership,
//! the one-way todo → done state machine, and the descendant rule before
//! touching the store. Listing and filtering live in query.rs.

use crate::store::{StoreError, TaskStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ── Entity types ──────────────────────────────────────────────

/// Task status lifecycle: Todo → Done, one way.
///
/// Done is terminal. Nothing in the system flips a task back, and a Done
/// task can no longer be edited or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Done,
}

impl TaskStatus {
    /// Strict parse of the wire form. Anything else is the caller's
    /// validation error, not a silent fallback.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

pub const MAX_TITLE_CHARS: usize = 255;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;
pub const DEFAULT_PRIORITY: u8 = 5;

/// A task — one node in a user's task tree.
///
/// `parent_id` points at the task it hangs under; None means root level.
/// `completed_at` is set exactly once, when status flips to Done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub user_id: Uuid,
    pub parent_id: Option<u64>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields for a new task. Raw input is validated at the HTTP boundary;
/// by here title and priority are already well-formed.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub parent_id: Option<u64>,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<u8>,
}

/// Edits for an existing task. None means keep the stored value.
#[derive(Debug, Clone)]
pub struct TaskPatch {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<u8>,
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task not found")]
    NotFound,
    #[error("task belongs to another user")]
    NotOwner,
    #[error("task is already completed")]
    AlreadyCompleted,
    #[error("a descendant task is not done")]
    IncompleteChildren,
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Lifecycle ──────────────────────────────────────────────────

/// Load a task and check it belongs to `owner`. The shared guard in front
/// of every per-task operation, reads included.
pub fn fetch(store: &TaskStore, owner: Uuid, task_id: u64) -> Result<Task, TaskError> {
    let task = store.get_task(task_id)?.ok_or(TaskError::NotFound)?;
    if task.user_id != owner {
        return Err(TaskError::NotOwner);
    }
    Ok(task)
}

/// Create a task. New tasks always start as Todo — there is no way to be
/// born completed. A parent that doesn't exist, or belongs to someone
/// else, reads as absent so foreign task ids stay unguessable.
pub fn create(
    store: &TaskStore,
    owner: Uuid,
    new: NewTask,
    now: DateTime<Utc>,
) -> Result<Task, TaskError> {
    if let Some(parent_id) = new.parent_id {
        match store.get_task(parent_id)? {
            Some(parent) if parent.user_id == owner => {}
            _ => return Err(TaskError::NotFound),
        }
    }

    let task = Task {
        id: store.next_task_id()?,
        user_id: owner,
        parent_id: new.parent_id,
        title: new.title,
        description: new.description,
        status: TaskStatus::Todo,
        priority: new.priority.unwrap_or(DEFAULT_PRIORITY),
        created_at: now,
        completed_at: None,
    };
    store.put_task(&task)?;
    Ok(task)
}

/// Edit title/description/priority. Blocked once the task is Done.
/// Status and completed_at are never touched here.
pub fn update(
    store: &TaskStore,
    owner: Uuid,
    task_id: u64,
    patch: TaskPatch,
) -> Result<Task, TaskError> {
    let mut task = fetch(store, owner, task_id)?;
    if task.status == TaskStatus::Done {
        return Err(TaskError::AlreadyCompleted);
    }

    task.title = patch.title;
    if let Some(description) = patch.description {
        task.description = Some(description);
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }

    store.put_task(&task)?;
    Ok(task)
}

/// The one-way transition to Done. Requires every descendant, at every
/// depth, to already be Done.
pub fn complete(
    store: &TaskStore,
    owner: Uuid,
    task_id: u64,
    now: DateTime<Utc>,
) -> Result<Task, TaskError> {
    let mut task = fetch(store, owner, task_id)?;
    if task.status == TaskStatus::Done {
        return Err(TaskError::AlreadyCompleted);
    }
    if !all_descendants_done(store, task_id)? {
        return Err(TaskError::IncompleteChildren);
    }

    task.status = TaskStatus::Done;
    task.completed_at = Some(now);
    store.put_task(&task)?;
    Ok(task)
}

/// Remove a task and its whole subtree. Completed tasks are immutable,
/// so they can't be deleted either.
pub fn delete(store: &TaskStore, owner: Uuid, task_id: u64) -> Result<(), TaskError> {
    let task = fetch(store, owner, task_id)?;
    if task.status == TaskStatus::Done {
        return Err(TaskError::AlreadyCompleted);
    }
    store.delete_subtree(task_id)?;
    Ok(())
}

// ── Hierarchy ──────────────────────────────────────────────────

/// Whether every descendant of `task_id`, at every depth, is Done.
///
/// Walks the tree with an explicit work list instead of recursing — depth
/// is unbounded and must not be capped by the call stack. Bails on the
/// first non-Done descendant. A missing task has no children, so it reads
/// as done. Reads are individual lookups, not one snapshot: a sibling
/// completing mid-walk can produce a stale answer, which the single-user
/// workload tolerates.
pub fn all_descendants_done(store: &TaskStore, task_id: u64) -> Result<bool, StoreError> {
    let mut pending = vec![task_id];
    while let Some(id) = pending.pop() {
        for child in store.children_of(id)? {
            if child.status != TaskStatus::Done {
                return Ok(false);
            }
            pending.push(child.id);
        }
    }
    Ok(true)
}

// ── Tests ──────────────────────────────────────────────────────
