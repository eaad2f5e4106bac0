//! Selection tracking for bulk operations on the displayed list.

use std::collections::HashSet;

use crate::task::Task;

/// The currently displayed tasks and which of them are selected.
///
/// Selection only ever holds ids present in the displayed list: replacing
/// the list prunes ids that disappeared from it.
#[derive(Debug, Clone, Default)]
pub struct TaskSelection {
    tasks: Vec<Task>,
    selected: HashSet<i64>,
}

impl TaskSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayed list, dropping selections for tasks that are
    /// no longer in it.
    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        let present: HashSet<i64> = self.tasks.iter().map(|t| t.id).collect();
        self.selected.retain(|id| present.contains(id));
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Select a displayed task. Returns false if `id` is not displayed.
    pub fn select(&mut self, id: i64) -> bool {
        if self.task(id).is_none() {
            return false;
        }
        self.selected.insert(id);
        true
    }

    pub fn deselect(&mut self, id: i64) {
        self.selected.remove(&id);
    }

    pub fn set_selected(&mut self, id: i64, selected: bool) {
        if selected {
            self.select(id);
        } else {
            self.deselect(id);
        }
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// Select every displayed task, or clear the selection.
    pub fn select_all(&mut self, select: bool) {
        if select {
            self.selected.extend(self.tasks.iter().map(|t| t.id));
        } else {
            self.selected.clear();
        }
    }

    /// "Select All" / "Deselect All": selects everything unless everything
    /// is already selected. Returns the new state.
    pub fn toggle_all(&mut self) -> bool {
        let select = !self.all_selected();
        self.select_all(select);
        select
    }

    pub fn all_selected(&self) -> bool {
        self.selected_count() == self.len()
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected tasks, in display order.
    pub fn selected_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| self.selected.contains(&t.id))
            .cloned()
            .collect()
    }
}
