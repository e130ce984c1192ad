//! Task record types for the shared Taskboard document.
//!
//! A [`Task`] is the unit of reconciliation: two records with the same
//! [`TaskId`] are the same task observed at different points in time, and
//! the one with the larger `updated_at` wins as a whole. Deletion is a
//! tombstone (`deleted_at`), never physical removal, so deletes propagate
//! through the same last-writer-wins rule as edits.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel user id marking orphaned ownership.
pub const UNASSIGNED: &str = "unassigned";

/// Placeholder title for records that carry none.
pub const DEFAULT_TITLE: &str = "UNTITLED";

/// Project label for records that carry none.
pub const DEFAULT_PROJECT: &str = "GENERAL";

/// Opaque, stable task identifier.
///
/// New identifiers are UUID v7 strings; historical records may carry any
/// string (including stringified numeric ids), which is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// The default.
    #[default]
    Med,
    /// Needs attention first.
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Med => write!(f, "med"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Kanban column a task sits in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not started.
    #[default]
    Todo,
    /// Being worked on.
    Doing,
    /// Waiting for review.
    Review,
    /// Finished.
    Done,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::Doing => write!(f, "doing"),
            Self::Review => write!(f, "review"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// A checklist entry inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    /// Identifier, unique within the parent task.
    pub id: String,
    /// Checklist text.
    pub title: String,
    /// Whether the entry is ticked.
    pub completed: bool,
    /// Milliseconds since epoch when the entry was added.
    pub created_at: i64,
    /// Milliseconds since epoch when the entry was ticked.
    pub completed_at: Option<i64>,
}

/// A day scheduled for a task on the timeline view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttDay {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    /// Users working on the task that day. Never `Some(vec![])`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
}

/// A task in the shared document, in the current schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable identity; never reassigned.
    pub id: TaskId,
    /// Uppercased display title.
    pub title: String,
    /// Uppercased grouping label.
    pub project: String,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
    /// Priority.
    pub priority: Priority,
    /// Kanban column.
    pub status: Status,
    /// Assigned user ids, in display order.
    pub assigned_to: Vec<String>,
    /// User id of the creator.
    pub created_by: String,
    /// Free-form notes.
    pub notes: String,
    /// Starred by the user.
    pub favorite: bool,
    /// Hidden from the board but kept.
    pub archived: bool,
    /// When the task was archived.
    pub archived_at: Option<i64>,
    /// Checklist entries.
    pub subtasks: Vec<Subtask>,
    /// Timeline schedule.
    pub gantt_days: Vec<GanttDay>,
    /// Creation time (ms since epoch). Immutable.
    pub created_at: i64,
    /// Last mutation time (ms since epoch). Sole conflict-resolution authority.
    pub updated_at: i64,
    /// Time the task last moved to done; `None` otherwise.
    pub completed_at: Option<i64>,
    /// Tombstone marker.
    pub deleted_at: Option<i64>,
}

impl Task {
    /// Returns `true` if the task is a tombstone.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` if the task belongs on the board (not deleted, not archived).
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.is_deleted() && !self.archived
    }
}
