//! Task storage module with pluggable backends.
//!
//! Supports:
//! - `memory`: In-memory storage (non-persistent, for testing)
//! - `sqlite`: SQLite database (default)
//!
//! Both backends keep a [`LiveQueryRegistry`]. Reads can be taken as a
//! one-off snapshot ([`TaskStore::get_all`], [`TaskStore::get_by_date_range`])
//! or as a live query ([`TaskStore::subscribe`]) that re-delivers the full
//! result set after every committed write that could change it.

mod live;
mod memory;
mod sqlite;

pub use live::{LiveQuery, LiveQueryRegistry, Snapshot};
pub use memory::InMemoryTaskStore;
pub use sqlite::SqliteTaskStore;

use crate::date;
use crate::task::Task;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task {0} not found")]
    NotFound(i64),

    #[error("Task {0} already exists")]
    AlreadyExists(i64),
}

/// Filter applied by a read or a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskQuery {
    /// Every task, ascending id.
    All,
    /// Tasks with `start <= due_date < end`, ascending id.
    DateRange { start: i64, end: i64 },
}

impl TaskQuery {
    /// Range query covering the local day that contains `ms`.
    pub fn for_day(ms: i64) -> Self {
        let (start, end) = date::day_range(ms);
        Self::DateRange { start, end }
    }

    pub fn matches(&self, task: &Task) -> bool {
        match *self {
            Self::All => true,
            Self::DateRange { start, end } => {
                matches!(task.due_date, Some(due) if due >= start && due < end)
            }
        }
    }

    /// Whether `change` could alter this query's result set.
    pub fn affected_by(&self, change: &Change) -> bool {
        change.touched().into_iter().any(|task| self.matches(task))
    }
}

/// A committed write, as seen by live queries.
#[derive(Debug, Clone)]
pub enum Change {
    Inserted(Task),
    /// Both versions are kept so a range query notices a task moving out.
    Updated { before: Task, after: Task },
    Deleted(Vec<Task>),
}

impl Change {
    /// Every row version this change touched.
    pub fn touched(&self) -> Vec<&Task> {
        match self {
            Self::Inserted(task) => vec![task],
            Self::Updated { before, after } => vec![before, after],
            Self::Deleted(tasks) => tasks.iter().collect(),
        }
    }
}

/// Task store trait - implemented by all storage backends.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether this store persists data across restarts.
    fn is_persistent(&self) -> bool;

    /// Persist a task and return its id. A fresh id is assigned when the
    /// task's id is unset.
    async fn insert(&self, task: &Task) -> Result<i64, StoreError>;

    /// Replace the stored record with `task.id`.
    ///
    /// Returns `StoreError::NotFound` if no such record exists; nothing is
    /// written in that case.
    async fn update(&self, task: &Task) -> Result<(), StoreError>;

    /// Delete a task by id. Absent ids are ignored.
    async fn delete(&self, task: &Task) -> Result<usize, StoreError> {
        self.delete_many(std::slice::from_ref(task)).await
    }

    /// Delete tasks by id in one transaction. Returns how many rows were
    /// removed; absent ids are ignored.
    async fn delete_many(&self, tasks: &[Task]) -> Result<usize, StoreError>;

    /// One-off snapshot of `query`.
    async fn query(&self, query: TaskQuery) -> Result<Vec<Task>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Task>, StoreError> {
        self.query(TaskQuery::All).await
    }

    async fn get_by_date_range(
        &self,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<Vec<Task>, StoreError> {
        self.query(TaskQuery::DateRange {
            start: start_inclusive,
            end: end_exclusive,
        })
        .await
    }

    /// Open a live query. The current result set is delivered immediately,
    /// then again after each write that affects it.
    async fn subscribe(&self, query: TaskQuery) -> Result<LiveQuery, StoreError>;
}

/// Task store type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    Memory,
    #[default]
    Sqlite,
}

impl StoreType {
    /// Parse from environment variable value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" | "db" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Create a task store based on type and data directory.
pub async fn create_task_store(
    store_type: StoreType,
    data_dir: PathBuf,
) -> Result<Arc<dyn TaskStore>, StoreError> {
    match store_type {
        StoreType::Memory => Ok(Arc::new(InMemoryTaskStore::new())),
        StoreType::Sqlite => {
            let store = SqliteTaskStore::new(data_dir).await?;
            Ok(Arc::new(store))
        }
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Storage(format!("Task join error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(id: i64, due: Option<i64>) -> Task {
        let mut task = Task::new(format!("task {}", id), "", due);
        task.id = id;
        task
    }

    #[test]
    fn test_range_is_half_open() {
        let query = TaskQuery::DateRange {
            start: 1_000,
            end: 2_000,
        };
        assert!(query.matches(&dated(1, Some(1_000))));
        assert!(query.matches(&dated(2, Some(1_999))));
        assert!(!query.matches(&dated(3, Some(2_000))));
        assert!(!query.matches(&dated(4, Some(999))));
        assert!(!query.matches(&dated(5, None)));
        assert!(TaskQuery::All.matches(&dated(6, None)));
    }

    #[test]
    fn test_range_query_sees_task_moving_out() {
        let query = TaskQuery::DateRange {
            start: 1_000,
            end: 2_000,
        };
        let moved = Change::Updated {
            before: dated(1, Some(1_500)),
            after: dated(1, Some(5_000)),
        };
        assert!(query.affected_by(&moved));

        let elsewhere = Change::Updated {
            before: dated(2, Some(3_000)),
            after: dated(2, Some(4_000)),
        };
        assert!(!query.affected_by(&elsewhere));
        assert!(TaskQuery::All.affected_by(&elsewhere));

        assert!(!query.affected_by(&Change::Deleted(vec![])));
    }

    #[test]
    fn test_store_type_parse() {
        assert_eq!(StoreType::parse("memory"), Some(StoreType::Memory));
        assert_eq!(StoreType::parse("SQLite"), Some(StoreType::Sqlite));
        assert_eq!(StoreType::parse("db"), Some(StoreType::Sqlite));
        assert_eq!(StoreType::parse("json"), None);
        assert_eq!(StoreType::default(), StoreType::Sqlite);
    }

    #[tokio::test]
    async fn test_create_memory_store() {
        let store = create_task_store(StoreType::Memory, PathBuf::from("unused"))
            .await
            .expect("memory store");
        assert!(!store.is_persistent());
    }
}
