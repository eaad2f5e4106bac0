//! Task entity.
//!
//! A task is the only persisted record. Every mutation (rename, new
//! description, done toggle, new due date) is a full-record replace keyed
//! by `id`, so the helpers here return modified copies rather than editing
//! in place.

use serde::{Deserialize, Serialize};

use crate::date;

/// Id carried by a task that has not been inserted yet.
pub const UNSET_ID: i64 = 0;

/// A persisted to-do record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the store on insert, never reused.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub done: bool,
    /// Due date in milliseconds since the epoch, at local midnight.
    /// `None` or a non-positive value means "no date".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<i64>,
}

impl Task {
    /// Create a not-yet-persisted task. `done` starts out false.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        due_date: Option<i64>,
    ) -> Self {
        Self {
            id: UNSET_ID,
            name: name.into(),
            description: description.into(),
            done: false,
            due_date,
        }
    }

    /// Whether the store still has to assign an id.
    pub fn is_new(&self) -> bool {
        self.id == UNSET_ID
    }

    pub fn has_due_date(&self) -> bool {
        matches!(self.due_date, Some(ms) if ms > 0)
    }

    /// Due date as `dd/MM/yyyy`, or `No Date`.
    pub fn due_date_label(&self) -> String {
        date::format_day_or_none(self.due_date)
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self.clone()
        }
    }

    pub fn with_done(&self, done: bool) -> Self {
        Self {
            done,
            ..self.clone()
        }
    }

    /// Copy with the due date moved to the local day containing `ms`.
    pub fn with_due_day(&self, ms: i64) -> Self {
        Self {
            due_date: Some(date::start_of_day(ms)),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_is_unsaved_and_open() {
        let task = Task::new("Buy milk", "2%", Some(1_717_200_000_000));
        assert!(task.is_new());
        assert!(!task.done);
        assert_eq!(task.due_date, Some(1_717_200_000_000));
    }

    #[test]
    fn test_non_positive_due_date_means_no_date() {
        let mut task = Task::new("a", "b", None);
        assert!(!task.has_due_date());
        assert_eq!(task.due_date_label(), "No Date");

        task.due_date = Some(0);
        assert!(!task.has_due_date());
        task.due_date = Some(-42);
        assert!(!task.has_due_date());
        assert_eq!(task.due_date_label(), "No Date");
    }

    #[test]
    fn test_edits_keep_identity() {
        let mut task = Task::new("old", "desc", None);
        task.id = 7;

        let renamed = task.with_name("new");
        assert_eq!(renamed.id, 7);
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.description, "desc");

        let finished = task.with_done(true);
        assert_eq!(finished.id, 7);
        assert!(finished.done);
        assert!(!task.done, "receiver must be untouched");
    }

    #[test]
    fn test_with_due_day_normalizes_to_midnight() {
        let task = Task::new("a", "b", None).with_due_day(1_717_245_296_789);
        let due = task.due_date.expect("due date set");
        assert_eq!(date::start_of_day(due), due);
        assert!(due <= 1_717_245_296_789);
    }

    #[test]
    fn test_serde_shape() {
        let mut task = Task::new("Buy milk", "2%", Some(1_717_200_000_000));
        task.id = 1;
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "id": 1,
                "name": "Buy milk",
                "description": "2%",
                "done": false,
                "due_date": 1_717_200_000_000_i64
            })
        );

        let parsed: Task =
            serde_json::from_str(r#"{"name":"x","description":"y"}"#).unwrap();
        assert!(parsed.is_new());
        assert!(!parsed.done);
        assert_eq!(parsed.due_date, None);
    }
}
