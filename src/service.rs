//! Task service: the single entry point between UI actions and the store.
//!
//! Holds the draft fields of the "new task" form and the task-added latch,
//! exposes live queries, and funnels every write through one queue drained
//! by a single writer task. Writes are fire-and-forget: failures go to an
//! [`ErrorSink`] instead of back to the caller.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::date;
use crate::store::{LiveQuery, StoreError, TaskQuery, TaskStore};
use crate::task::Task;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Task writer has shut down")]
    Closed,
}

/// Receives errors from background writes.
pub trait ErrorSink: Send + Sync {
    fn report(&self, operation: &'static str, error: &StoreError);
}

/// Default sink: logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, operation: &'static str, error: &StoreError) {
        match error {
            StoreError::NotFound(id) => {
                warn!(operation, task_id = *id, "Task write skipped: {}", error)
            }
            _ => error!(operation, "Task write failed: {}", error),
        }
    }
}

/// In-progress values of the "new task" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<i64>,
}

enum WriteOp {
    Add(Task),
    Update(Task),
    Delete(Vec<Task>),
    Flush(oneshot::Sender<()>),
}

struct TaskWriter {
    store: Arc<dyn TaskStore>,
    draft: Arc<Mutex<Draft>>,
    task_added: Arc<watch::Sender<bool>>,
    errors: Arc<dyn ErrorSink>,
}

impl TaskWriter {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<WriteOp>) {
        while let Some(op) = rx.recv().await {
            match op {
                WriteOp::Add(task) => match self.store.insert(&task).await {
                    Ok(id) => {
                        debug!(task_id = id, "Task added");
                        *lock_draft(&self.draft) = Draft::default();
                        self.task_added.send_replace(true);
                    }
                    Err(e) => self.errors.report("add", &e),
                },
                WriteOp::Update(task) => {
                    if let Err(e) = self.store.update(&task).await {
                        self.errors.report("update", &e);
                    }
                }
                WriteOp::Delete(tasks) => match self.store.delete_many(&tasks).await {
                    Ok(count) => debug!(count, requested = tasks.len(), "Tasks deleted"),
                    Err(e) => self.errors.report("delete", &e),
                },
                WriteOp::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Task writer stopped");
    }
}

fn lock_draft(draft: &Mutex<Draft>) -> MutexGuard<'_, Draft> {
    draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// View-model over a [`TaskStore`].
///
/// Must be created inside a Tokio runtime: construction spawns the writer.
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    draft: Arc<Mutex<Draft>>,
    task_added: Arc<watch::Sender<bool>>,
    writes: mpsc::UnboundedSender<WriteOp>,
    writer: JoinHandle<()>,
}

impl TaskService {
    /// Create a service that logs write failures.
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self::with_error_sink(store, Arc::new(TracingErrorSink))
    }

    pub fn with_error_sink(store: Arc<dyn TaskStore>, errors: Arc<dyn ErrorSink>) -> Self {
        let draft = Arc::new(Mutex::new(Draft::default()));
        let (task_added, _) = watch::channel(false);
        let task_added = Arc::new(task_added);
        let (writes, rx) = mpsc::unbounded_channel();

        let writer = TaskWriter {
            store: Arc::clone(&store),
            draft: Arc::clone(&draft),
            task_added: Arc::clone(&task_added),
            errors,
        };
        let writer = tokio::spawn(writer.run(rx));

        Self {
            store,
            draft,
            task_added,
            writes,
            writer,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    fn submit(&self, op: WriteOp) -> Result<(), ServiceError> {
        self.writes.send(op).map_err(|_| ServiceError::Closed)
    }

    // === Draft fields ===

    pub fn set_draft_name(&self, name: impl Into<String>) {
        lock_draft(&self.draft).name = Some(name.into());
    }

    pub fn set_draft_description(&self, description: impl Into<String>) {
        lock_draft(&self.draft).description = Some(description.into());
    }

    pub fn set_draft_due_date(&self, due_date: Option<i64>) {
        lock_draft(&self.draft).due_date = due_date;
    }

    pub fn draft(&self) -> Draft {
        lock_draft(&self.draft).clone()
    }

    // === Writes ===

    /// Queue a new task built from the draft fields.
    ///
    /// Missing name or description become empty strings; the due date
    /// defaults to today and is normalized to local midnight. No
    /// validation happens here. Once the insert commits, the drafts are
    /// cleared and the task-added latch is set. The clear happens on the
    /// writer, so a draft set after this call but before the commit is
    /// cleared too.
    pub fn add_task(&self) -> Result<(), ServiceError> {
        let draft = self.draft();
        let due = date::start_of_day(draft.due_date.unwrap_or_else(date::now_millis));
        let task = Task::new(
            draft.name.unwrap_or_default(),
            draft.description.unwrap_or_default(),
            Some(due),
        );
        self.submit(WriteOp::Add(task))
    }

    pub fn update_task(&self, task: &Task) -> Result<(), ServiceError> {
        self.submit(WriteOp::Update(task.clone()))
    }

    pub fn delete_task(&self, task: &Task) -> Result<(), ServiceError> {
        self.submit(WriteOp::Delete(vec![task.clone()]))
    }

    pub fn delete_tasks(&self, tasks: &[Task]) -> Result<(), ServiceError> {
        if tasks.is_empty() {
            return Ok(());
        }
        self.submit(WriteOp::Delete(tasks.to_vec()))
    }

    pub fn rename_task(&self, task: &Task, name: impl Into<String>) -> Result<(), ServiceError> {
        self.update_task(&task.with_name(name))
    }

    pub fn describe_task(
        &self,
        task: &Task,
        description: impl Into<String>,
    ) -> Result<(), ServiceError> {
        self.update_task(&task.with_description(description))
    }

    pub fn set_task_done(&self, task: &Task, done: bool) -> Result<(), ServiceError> {
        self.update_task(&task.with_done(done))
    }

    /// Move a task to the local day containing `ms`.
    pub fn set_task_date(&self, task: &Task, ms: i64) -> Result<(), ServiceError> {
        self.update_task(&task.with_due_day(ms))
    }

    /// Wait until every write submitted so far has been applied.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::Flush(tx))?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Close the queue and wait for the writer to apply what is left.
    pub async fn shutdown(self) {
        drop(self.writes);
        if let Err(e) = self.writer.await {
            error!("Task writer panicked: {}", e);
        }
    }

    // === Reads ===

    /// Live query over every task.
    pub async fn all_tasks(&self) -> Result<LiveQuery, StoreError> {
        self.store.subscribe(TaskQuery::All).await
    }

    /// Live query over the tasks due on the local day containing `ms`.
    pub async fn filter_by_date(&self, ms: i64) -> Result<LiveQuery, StoreError> {
        self.store.subscribe(TaskQuery::for_day(ms)).await
    }

    // === Task-added latch ===

    pub fn task_added(&self) -> bool {
        *self.task_added.borrow()
    }

    pub fn watch_task_added(&self) -> watch::Receiver<bool> {
        self.task_added.subscribe()
    }

    pub fn reset_added_flag(&self) {
        self.task_added.send_replace(false);
    }
}
