//! Task collection state and reconciliation.
//!
//! [`TaskStore`] owns the live document and exposes the mutation API the UI
//! layer drives; [`merge`] holds the pure whole-record Last-Write-Wins merge
//! used to fold other writers' snapshots into it.

pub mod merge;
pub mod store;

pub use merge::{incoming_wins, reconcile, same_records};
pub use store::{NewTask, TaskPatch, TaskSnapshot, TaskStore};

use thiserror::Error;

/// Errors that can occur during task operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
    /// Subtask with the given ID was not found.
    #[error("subtask not found: {0}")]
    SubtaskNotFound(String),
    /// The task is a tombstone and can no longer be edited.
    #[error("task has been deleted: {0}")]
    Deleted(String),
}
