//! Live query registry.
//!
//! Backends register a query together with its initial result set while
//! holding their write lock, and call [`LiveQueryRegistry::publish`] after
//! every commit, still under that lock. Subscribers therefore receive
//! snapshots in commit order and never observe a partial write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;

use super::{Change, StoreError, TaskQuery};
use crate::task::Task;

/// One delivery on a live query: the full result set, or the error that
/// ended the subscription.
pub type Snapshot = Result<Vec<Task>, StoreError>;

struct Subscription {
    id: u64,
    query: TaskQuery,
    tx: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Shared registry of open live queries.
#[derive(Clone, Default)]
pub struct LiveQueryRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl LiveQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock_registry(&self.inner)
    }

    /// Register `query` and deliver `initial` as its first snapshot.
    pub fn register(&self, query: TaskQuery, initial: Vec<Task>) -> LiveQuery {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(initial));

        let mut registry = self.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscriptions.push(Subscription { id, query, tx });
        tracing::debug!(subscription = id, ?query, "Live query opened");

        LiveQuery {
            id,
            query,
            rx,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Recompute every query affected by `change` and push the result.
    ///
    /// `run` evaluates a query against the committed state. Subscriptions
    /// sharing a query share one evaluation. A failed evaluation is
    /// delivered to the subscriber and ends that subscription.
    pub fn publish<F>(&self, change: &Change, mut run: F)
    where
        F: FnMut(&TaskQuery) -> Result<Vec<Task>, StoreError>,
    {
        let mut registry = self.lock();
        let mut results: HashMap<TaskQuery, Vec<Task>> = HashMap::new();

        registry.subscriptions.retain(|sub| {
            if sub.tx.is_closed() {
                return false;
            }
            if !sub.query.affected_by(change) {
                return true;
            }
            let snapshot = match results.get(&sub.query) {
                Some(tasks) => Ok(tasks.clone()),
                None => run(&sub.query).map(|tasks| {
                    results.insert(sub.query, tasks.clone());
                    tasks
                }),
            };
            if let Err(e) = &snapshot {
                tracing::warn!(subscription = sub.id, "Live query failed: {}", e);
            }
            let keep = snapshot.is_ok();
            sub.tx.send(snapshot).is_ok() && keep
        });
    }

    /// Number of open subscriptions.
    pub fn len(&self) -> usize {
        let mut registry = self.lock();
        registry.subscriptions.retain(|sub| !sub.tx.is_closed());
        registry.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_registry(inner: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Receiving end of a live query. Dropping it unsubscribes.
pub struct LiveQuery {
    id: u64,
    query: TaskQuery,
    rx: mpsc::UnboundedReceiver<Snapshot>,
    registry: Weak<Mutex<Registry>>,
}

impl LiveQuery {
    pub fn query(&self) -> TaskQuery {
        self.query
    }

    /// Wait for the next snapshot. `None` once the subscription has ended
    /// and every queued snapshot was read.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Next queued snapshot, without waiting.
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }

    /// Drain the queue and return only the most recent snapshot.
    pub fn latest(&mut self) -> Option<Snapshot> {
        let mut last = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            last = Some(snapshot);
        }
        last
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            let id = self.id;
            lock_registry(&inner)
                .subscriptions
                .retain(|sub| sub.id != id);
            tracing::debug!(subscription = id, "Live query closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, due: Option<i64>) -> Task {
        let mut task = Task::new(format!("t{}", id), "", due);
        task.id = id;
        task
    }

    #[test]
    fn test_register_delivers_initial_snapshot() {
        let registry = LiveQueryRegistry::new();
        let mut live = registry.register(TaskQuery::All, vec![task(1, None)]);

        let first = live.try_next().expect("initial").expect("ok");
        assert_eq!(first.len(), 1);
        assert!(live.try_next().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_publish_only_reaches_affected_queries() {
        let registry = LiveQueryRegistry::new();
        let mut all = registry.register(TaskQuery::All, vec![]);
        let mut range = registry.register(
            TaskQuery::DateRange {
                start: 100,
                end: 200,
            },
            vec![],
        );
        all.latest();
        range.latest();

        let mut evaluations = 0;
        registry.publish(&Change::Inserted(task(1, Some(500))), |_| {
            evaluations += 1;
            Ok(vec![task(1, Some(500))])
        });

        assert_eq!(evaluations, 1);
        assert_eq!(all.try_next().unwrap().unwrap().len(), 1);
        assert!(range.try_next().is_none());
    }

    #[test]
    fn test_shared_query_is_evaluated_once() {
        let registry = LiveQueryRegistry::new();
        let mut a = registry.register(TaskQuery::All, vec![]);
        let mut b = registry.register(TaskQuery::All, vec![]);

        let mut evaluations = 0;
        registry.publish(&Change::Inserted(task(1, None)), |_| {
            evaluations += 1;
            Ok(vec![task(1, None)])
        });

        assert_eq!(evaluations, 1);
        assert_eq!(a.latest().unwrap().unwrap().len(), 1);
        assert_eq!(b.latest().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = LiveQueryRegistry::new();
        let live = registry.register(TaskQuery::All, vec![]);
        assert_eq!(registry.len(), 1);
        drop(live);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failed_recompute_ends_only_that_subscription() {
        let registry = LiveQueryRegistry::new();
        let day = TaskQuery::DateRange { start: 0, end: 10 };
        let mut failing = registry.register(day, vec![]);
        let mut healthy = registry.register(TaskQuery::All, vec![]);
        failing.latest();
        healthy.latest();

        registry.publish(&Change::Inserted(task(1, Some(5))), |query| match query {
            TaskQuery::All => Ok(vec![task(1, Some(5))]),
            TaskQuery::DateRange { .. } => Err(StoreError::Storage("disk gone".into())),
        });

        assert!(matches!(failing.next().await, Some(Err(StoreError::Storage(_)))));
        assert!(failing.next().await.is_none(), "stream should end after error");
        assert_eq!(healthy.next().await.unwrap().unwrap().len(), 1);
        assert_eq!(registry.len(), 1);
    }
}
