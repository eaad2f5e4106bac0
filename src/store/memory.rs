//! In-memory task store (non-persistent).

use super::{Change, LiveQuery, LiveQueryRegistry, StoreError, TaskQuery, TaskStore};
use crate::task::Task;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct MemoryState {
    /// Keyed by id, so iteration order is ascending id.
    tasks: BTreeMap<i64, Task>,
    /// `None` once `i64::MAX` has been used.
    next_id: Option<i64>,
}

impl MemoryState {
    fn select(&self, query: &TaskQuery) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|task| query.matches(task))
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<MemoryState>>,
    live: LiveQueryRegistry,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                tasks: BTreeMap::new(),
                next_id: Some(1),
            })),
            live: LiveQueryRegistry::new(),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn insert(&self, task: &Task) -> Result<i64, StoreError> {
        let mut state = self.state.write().await;
        let id = if task.is_new() {
            state
                .next_id
                .ok_or_else(|| StoreError::Storage("Task id space exhausted".to_string()))?
        } else if state.tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        } else {
            task.id
        };
        // Ids are never handed out twice, even after deletes.
        if state.next_id.is_some_and(|next| id >= next) {
            state.next_id = id.checked_add(1);
        }

        let stored = Task {
            id,
            ..task.clone()
        };
        state.tasks.insert(id, stored.clone());
        tracing::debug!(task_id = id, "Inserted task");

        self.live
            .publish(&Change::Inserted(stored), |query| Ok(state.select(query)));
        Ok(id)
    }

    async fn update(&self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state
            .tasks
            .get_mut(&task.id)
            .ok_or(StoreError::NotFound(task.id))?;
        let before = std::mem::replace(slot, task.clone());
        tracing::debug!(task_id = task.id, "Updated task");

        let change = Change::Updated {
            before,
            after: task.clone(),
        };
        self.live.publish(&change, |query| Ok(state.select(query)));
        Ok(())
    }

    async fn delete_many(&self, tasks: &[Task]) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let removed: Vec<Task> = tasks
            .iter()
            .filter_map(|task| state.tasks.remove(&task.id))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        let count = removed.len();
        tracing::debug!(count, "Deleted tasks");

        self.live
            .publish(&Change::Deleted(removed), |query| Ok(state.select(query)));
        Ok(count)
    }

    async fn query(&self, query: TaskQuery) -> Result<Vec<Task>, StoreError> {
        Ok(self.state.read().await.select(&query))
    }

    async fn subscribe(&self, query: TaskQuery) -> Result<LiveQuery, StoreError> {
        // Held across registration so no commit slips in between.
        let state = self.state.write().await;
        let initial = state.select(&query);
        Ok(self.live.register(query, initial))
    }
}
