//! redb-backed storage for users and tasks.
//!
//! The database is the source of truth: handlers read through it on every
//! request and each mutation commits one write transaction. Postcard is the
//! row codec. Child and owner lookups are table scans — fine at the scale of
//! personal task lists.

use crate::auth::User;
use crate::tasks::Task;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// Task ids are the row keys, so redb hands rows back in creation order.
const TASKS: TableDefinition<u64, &[u8]> = TableDefinition::new("tasks");
const USERS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");
const USERNAME_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("username_index");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_TASK_ID: &str = "next_task_id";

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<Database>,
}

impl TaskStore {
    /// Open (or create) the database at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        // Ensure tables exist
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TASKS)?;
            let _ = txn.open_table(USERS)?;
            let _ = txn.open_table(USERNAME_INDEX)?;
            let _ = txn.open_table(META)?;
        }
        txn.commit()?;

        Ok(TaskStore { db: Arc::new(db) })
    }

    // ── Task rows ──────────────────────────────────────────────

    /// Allocate the next task id. Ids start at 1 and only ever grow;
    /// the read-bump-write happens inside one write transaction, so
    /// two creates can never hand out the same id.
    pub fn next_task_id(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_write()?;
        let id = {
            let mut meta = txn.open_table(META)?;
            let id = match meta.get(NEXT_TASK_ID)? {
                Some(v) => v.value(),
                None => 1,
            };
            meta.insert(NEXT_TASK_ID, id + 1)?;
            id
        };
        txn.commit()?;
        Ok(id)
    }

    /// Insert or overwrite a task row.
    pub fn put_task(&self, task: &Task) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let bytes = postcard::to_allocvec(task)
                .map_err(|e| StoreError::Encode(e.to_string()))?;
            tasks.insert(task.id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_task(&self, id: u64) -> Result<Option<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;

        match tasks.get(id)? {
            Some(data) => {
                let task: Task = postcard::from_bytes(data.value())
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Direct children of a task, in id order.
    pub fn children_of(&self, parent_id: u64) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;

        let mut children = Vec::new();
        for entry in tasks.iter()? {
            let (_, value) = entry?;
            let task: Task = postcard::from_bytes(value.value())
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            if task.parent_id == Some(parent_id) {
                children.push(task);
            }
        }
        Ok(children)
    }

    /// Every task owned by one user, in id order.
    pub fn tasks_for_user(&self, owner: Uuid) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;

        let mut owned = Vec::new();
        for entry in tasks.iter()? {
            let (_, value) = entry?;
            let task: Task = postcard::from_bytes(value.value())
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            if task.user_id == owner {
                owned.push(task);
            }
        }
        Ok(owned)
    }

    /// Remove a task and every descendant under it, all in one write
    /// transaction — either the whole subtree goes or none of it does.
    pub fn delete_subtree(&self, root_id: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;

            // Map parent → children from a single scan, then walk the
            // subtree with a work list.
            let mut children: HashMap<u64, Vec<u64>> = HashMap::new();
            for entry in tasks.iter()? {
                let (key, value) = entry?;
                let task: Task = postcard::from_bytes(value.value())
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                if let Some(parent_id) = task.parent_id {
                    children.entry(parent_id).or_default().push(key.value());
                }
            }

            let mut doomed = vec![root_id];
            let mut pending = vec![root_id];
            while let Some(id) = pending.pop() {
                if let Some(kids) = children.get(&id) {
                    doomed.extend(kids);
                    pending.extend(kids);
                }
            }

            for id in doomed {
                tasks.remove(id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    // ── User rows ──────────────────────────────────────────────

    /// Insert a user and index their username in the same transaction.
    /// Returns false (writing nothing) if the username is already taken.
    pub fn create_user(&self, user: &User) -> Result<bool, StoreError> {
        let txn = self.db.begin_write()?;
        let created = {
            let mut users = txn.open_table(USERS)?;
            let mut index = txn.open_table(USERNAME_INDEX)?;

            if index.get(user.username.as_str())?.is_some() {
                false
            } else {
                let bytes = postcard::to_allocvec(user)
                    .map_err(|e| StoreError::Encode(e.to_string()))?;
                users.insert(user.id.as_bytes().as_slice(), bytes.as_slice())?;
                index.insert(user.username.as_str(), user.id.as_bytes().as_slice())?;
                true
            }
        };
        txn.commit()?;
        Ok(created)
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;

        match users.get(id.as_bytes().as_slice())? {
            Some(data) => {
                let user: User = postcard::from_bytes(data.value())
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(USERNAME_INDEX)?;

        match index.get(username)? {
            Some(id_data) => {
                let users = txn.open_table(USERS)?;
                match users.get(id_data.value())? {
                    Some(data) => {
                        let user: User = postcard::from_bytes(data.value())
                            .map_err(|e| StoreError::Decode(e.to_string()))?;
                        Ok(Some(user))
                    }
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("redb: {0}")]
    Redb(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
}

// redb 2.x has many error types. Blanket them all into StoreError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self { StoreError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

// ── Tests ──────────────────────────────────────────────────────
