//! SQLite-based task store.

use super::{
    join_error, Change, LiveQuery, LiveQueryRegistry, StoreError, TaskQuery, TaskStore,
};
use crate::task::Task;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Database file created inside the data directory.
pub const DB_FILE_NAME: &str = "tasks_database.db";

/// Bumping this wipes existing tasks on next open. There is no migration
/// path.
pub const SCHEMA_VERSION: i64 = 6;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    done INTEGER NOT NULL DEFAULT 0,
    due_date INTEGER
);

CREATE INDEX IF NOT EXISTS idx_tasks_due_date ON tasks(due_date);
"#;

const SELECT_TASKS: &str = "SELECT id, name, description, done, due_date FROM tasks";

pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
    live: LiveQueryRegistry,
}

impl SqliteTaskStore {
    /// Open (or create) `tasks_database.db` under `data_dir`.
    pub async fn new(data_dir: PathBuf) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&data_dir).await.map_err(|e| {
            StoreError::Storage(format!(
                "Failed to create data dir {}: {}",
                data_dir.display(),
                e
            ))
        })?;
        let db_path = data_dir.join(DB_FILE_NAME);

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            Self::prepare_schema(&conn)?;
            tracing::info!("Opened task database at {}", db_path.display());
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(join_error)??;

        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, gone when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::prepare_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            live: LiveQueryRegistry::new(),
        }
    }

    /// Create the table, or drop and recreate it when the stored schema
    /// version differs from [`SCHEMA_VERSION`].
    fn prepare_schema(conn: &Connection) -> Result<(), StoreError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != SCHEMA_VERSION {
            let has_table = conn
                .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'tasks'")?
                .exists([])?;
            if has_table {
                tracing::warn!(
                    from = version,
                    to = SCHEMA_VERSION,
                    "Task schema version changed, dropping existing tasks"
                );
                conn.execute_batch("DROP TABLE tasks;")?;
            }
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Location of the database file for `data_dir`.
    pub fn db_path(data_dir: &Path) -> PathBuf {
        data_dir.join(DB_FILE_NAME)
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        done: row.get::<_, i32>(3)? != 0,
        due_date: row.get(4)?,
    })
}

fn select_blocking(conn: &Connection, query: &TaskQuery) -> Result<Vec<Task>, StoreError> {
    let tasks = match *query {
        TaskQuery::All => {
            let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC", SELECT_TASKS))?;
            let tasks = stmt
                .query_map([], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            tasks
        }
        TaskQuery::DateRange { start, end } => {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE due_date >= ?1 AND due_date < ?2 ORDER BY id ASC",
                SELECT_TASKS
            ))?;
            let tasks = stmt
                .query_map(params![start, end], row_to_task)?
                .collect::<Result<Vec<_>, _>>()?;
            tasks
        }
    };
    Ok(tasks)
}

fn get_blocking(conn: &Connection, id: i64) -> Result<Option<Task>, StoreError> {
    let task = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_TASKS),
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn insert(&self, task: &Task) -> Result<i64, StoreError> {
        let conn = self.conn.clone();
        let live = self.live.clone();
        let task = task.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();

            let id = if task.is_new() {
                conn.execute(
                    "INSERT INTO tasks (name, description, done, due_date)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![task.name, task.description, task.done, task.due_date],
                )?;
                conn.last_insert_rowid()
            } else {
                if get_blocking(&conn, task.id)?.is_some() {
                    return Err(StoreError::AlreadyExists(task.id));
                }
                conn.execute(
                    "INSERT INTO tasks (id, name, description, done, due_date)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![task.id, task.name, task.description, task.done, task.due_date],
                )?;
                task.id
            };
            tracing::debug!(task_id = id, "Inserted task");

            let stored = Task { id, ..task };
            live.publish(&Change::Inserted(stored), |query| {
                select_blocking(&conn, query)
            });
            Ok(id)
        })
        .await
        .map_err(join_error)?
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let live = self.live.clone();
        let task = task.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();

            let before = get_blocking(&conn, task.id)?.ok_or(StoreError::NotFound(task.id))?;
            conn.execute(
                "UPDATE tasks SET name = ?2, description = ?3, done = ?4, due_date = ?5
                 WHERE id = ?1",
                params![task.id, task.name, task.description, task.done, task.due_date],
            )?;
            tracing::debug!(task_id = task.id, "Updated task");

            let change = Change::Updated {
                before,
                after: task,
            };
            live.publish(&change, |query| select_blocking(&conn, query));
            Ok(())
        })
        .await
        .map_err(join_error)?
    }

    async fn delete_many(&self, tasks: &[Task]) -> Result<usize, StoreError> {
        let conn = self.conn.clone();
        let live = self.live.clone();
        let ids: Vec<i64> = tasks.iter().map(|t| t.id).collect();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();

            let tx = conn.unchecked_transaction()?;
            let mut removed = Vec::new();
            for id in ids {
                if let Some(task) = get_blocking(&tx, id)? {
                    tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
                    removed.push(task);
                }
            }
            tx.commit()?;

            if removed.is_empty() {
                return Ok(0);
            }
            let count = removed.len();
            tracing::debug!(count, "Deleted tasks");

            live.publish(&Change::Deleted(removed), |query| {
                select_blocking(&conn, query)
            });
            Ok(count)
        })
        .await
        .map_err(join_error)?
    }

    async fn query(&self, query: TaskQuery) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            select_blocking(&conn, &query)
        })
        .await
        .map_err(join_error)?
    }

    async fn subscribe(&self, query: TaskQuery) -> Result<LiveQuery, StoreError> {
        let conn = self.conn.clone();
        let live = self.live.clone();
        tokio::task::spawn_blocking(move || {
            // Registered under the connection lock so no commit slips in
            // between the initial snapshot and the first push.
            let conn = conn.blocking_lock();
            let initial = select_blocking(&conn, &query)?;
            Ok(live.register(query, initial))
        })
        .await
        .map_err(join_error)?
    }
}
