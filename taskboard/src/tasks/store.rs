//! Explicit state container for the live task document.
//!
//! `TaskStore` is the single owner of the in-memory collection. Every local
//! mutation goes through its API, which stamps `updated_at` with a value
//! strictly greater than both the previous stamp and the task's current
//! `updated_at`, then publishes a fresh snapshot to subscribers.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;
use uuid::Uuid;

use taskboard_proto::document::TaskDocument;
use taskboard_proto::task::{
    DEFAULT_PROJECT, GanttDay, Priority, Status, Subtask, Task, TaskId, UNASSIGNED,
};

use super::TaskError;

/// Immutable view of the collection handed to subscribers.
pub type TaskSnapshot = Arc<[Task]>;

/// Fields for a new task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Display title (uppercased on creation).
    pub title: String,
    /// Project label; empty means the default project.
    pub project: String,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
    /// Priority.
    pub priority: Priority,
    /// Assignees; empty means the current user.
    pub assigned_to: Vec<String>,
    /// Free-form notes.
    pub notes: String,
}

/// A partial edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New project label.
    pub project: Option<String>,
    /// New due date (`Some(None)` clears it).
    pub due_date: Option<Option<NaiveDate>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New status.
    pub status: Option<Status>,
    /// New assignee list.
    pub assigned_to: Option<Vec<String>>,
    /// New notes.
    pub notes: Option<String>,
}

/// Owns the live document and publishes snapshots on change.
pub struct TaskStore {
    document: TaskDocument,
    user_id: Option<String>,
    last_stamp: i64,
    snapshot_tx: watch::Sender<TaskSnapshot>,
}

impl TaskStore {
    /// Creates an empty store for the given session user.
    #[must_use]
    pub fn new(user_id: Option<String>) -> Self {
        let (snapshot_tx, _) = watch::channel(TaskSnapshot::from(Vec::new()));
        Self {
            document: TaskDocument::default(),
            user_id,
            last_stamp: 0,
            snapshot_tx,
        }
    }

    /// Returns the session user, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Returns the whole document.
    #[must_use]
    pub const fn document(&self) -> &TaskDocument {
        &self.document
    }

    /// Returns every task, tombstones included.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.document.tasks
    }

    /// Looks up a task by id, tombstones included.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.document.tasks.iter().find(|t| t.id == *id)
    }

    /// Returns tasks that belong on the board, oldest first.
    #[must_use]
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .document
            .tasks
            .iter()
            .filter(|t| t.is_visible())
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Returns archived, non-deleted tasks, most recently archived first.
    #[must_use]
    pub fn archived_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .document
            .tasks
            .iter()
            .filter(|t| t.archived && !t.is_deleted())
            .collect();
        tasks.sort_by_key(|t| std::cmp::Reverse(t.archived_at.unwrap_or(t.updated_at)));
        tasks
    }

    /// Subscribes to snapshots published after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Replaces the whole document (used when publishing reconciled state).
    pub fn replace_document(&mut self, document: TaskDocument) {
        self.document = document;
        self.observe_stamps();
        self.publish();
    }

    /// Replaces the task collection, keeping the document settings.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.document.tasks = tasks;
        self.observe_stamps();
        self.publish();
    }

    /// Creates a task owned by the session user.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] if the title is blank.
    pub fn create_task(&mut self, new: NewTask) -> Result<Task, TaskError> {
        let title = clean_title(&new.title)?;
        let project = clean_project(&new.project);
        let now = self.stamp(0);
        let owner = self.user_id.clone().unwrap_or_else(|| UNASSIGNED.to_string());
        let assigned_to = if new.assigned_to.is_empty() {
            vec![owner.clone()]
        } else {
            new.assigned_to
        };

        let task = Task {
            id: TaskId::new(),
            title,
            project: project.clone(),
            due_date: new.due_date,
            priority: new.priority,
            status: Status::Todo,
            assigned_to,
            created_by: owner,
            notes: new.notes,
            favorite: false,
            archived: false,
            archived_at: None,
            subtasks: Vec::new(),
            gantt_days: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            deleted_at: None,
        };

        self.document.remember_project(&project);
        self.document.tasks.push(task.clone());
        self.publish();
        Ok(task)
    }

    /// Applies a partial edit.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`], [`TaskError::Deleted`], or
    /// [`TaskError::TitleEmpty`].
    pub fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let title = patch.title.as_deref().map(clean_title).transpose()?;
        let project = patch.project.as_deref().map(clean_project);
        if let Some(project) = &project {
            self.ensure_editable(id)?;
            self.document.remember_project(project);
        }
        self.mutate(id, |task, now| {
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(project) = project {
                task.project = project;
            }
            if let Some(due_date) = patch.due_date {
                task.due_date = due_date;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(status) = patch.status {
                apply_status(task, status, now);
            }
            if let Some(assigned_to) = patch.assigned_to {
                task.assigned_to = assigned_to;
            }
            if let Some(notes) = patch.notes {
                task.notes = notes;
            }
            Ok(())
        })
    }

    /// Moves a task to another column, maintaining `completed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] or [`TaskError::Deleted`].
    pub fn set_status(&mut self, id: &TaskId, status: Status) -> Result<Task, TaskError> {
        self.mutate(id, |task, now| {
            apply_status(task, status, now);
            Ok(())
        })
    }

    /// Tombstones a task. The record stays in the collection so the
    /// deletion reaches other writers.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] or [`TaskError::Deleted`].
    pub fn delete_task(&mut self, id: &TaskId) -> Result<Task, TaskError> {
        self.mutate(id, |task, now| {
            task.deleted_at = Some(now);
            Ok(())
        })
    }

    /// Archives or unarchives a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] or [`TaskError::Deleted`].
    pub fn set_archived(&mut self, id: &TaskId, archived: bool) -> Result<Task, TaskError> {
        self.mutate(id, |task, now| {
            task.archived = archived;
            task.archived_at = archived.then_some(now);
            Ok(())
        })
    }

    /// Flips the favorite flag.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] or [`TaskError::Deleted`].
    pub fn toggle_favorite(&mut self, id: &TaskId) -> Result<Task, TaskError> {
        self.mutate(id, |task, _| {
            task.favorite = !task.favorite;
            Ok(())
        })
    }

    /// Appends a checklist entry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`], [`TaskError::TaskNotFound`], or
    /// [`TaskError::Deleted`].
    pub fn add_subtask(&mut self, id: &TaskId, title: &str) -> Result<Subtask, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::TitleEmpty);
        }
        let mut added = None;
        self.mutate(id, |task, now| {
            let subtask = Subtask {
                id: Uuid::now_v7().to_string(),
                title: title.to_string(),
                completed: false,
                created_at: now,
                completed_at: None,
            };
            task.subtasks.push(subtask.clone());
            added = Some(subtask);
            Ok(())
        })?;
        added.ok_or_else(|| TaskError::TaskNotFound(id.to_string()))
    }

    /// Ticks or unticks a checklist entry.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::SubtaskNotFound`], [`TaskError::TaskNotFound`],
    /// or [`TaskError::Deleted`].
    pub fn toggle_subtask(&mut self, id: &TaskId, subtask_id: &str) -> Result<Task, TaskError> {
        self.mutate(id, |task, now| {
            let subtask = task
                .subtasks
                .iter_mut()
                .find(|s| s.id == subtask_id)
                .ok_or_else(|| TaskError::SubtaskNotFound(subtask_id.to_string()))?;
            subtask.completed = !subtask.completed;
            subtask.completed_at = subtask.completed.then_some(now);
            Ok(())
        })
    }

    /// Schedules (or reschedules) a timeline day. An empty user list
    /// removes the day.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TaskNotFound`] or [`TaskError::Deleted`].
    pub fn schedule_day(
        &mut self,
        id: &TaskId,
        date: NaiveDate,
        user_ids: Vec<String>,
    ) -> Result<Task, TaskError> {
        let date = date.format("%Y-%m-%d").to_string();
        self.mutate(id, |task, _| {
            task.gantt_days.retain(|d| d.date != date);
            if !user_ids.is_empty() {
                task.gantt_days.push(GanttDay {
                    date,
                    user_ids: Some(user_ids),
                });
                task.gantt_days.sort_by(|a, b| a.date.cmp(&b.date));
            }
            Ok(())
        })
    }

    /// Records the folder associated with a project.
    pub fn set_directory(&mut self, project: &str, path: &str) {
        self.document
            .directories
            .get_or_insert_with(Default::default)
            .insert(clean_project(project), path.to_string());
        self.publish();
    }

    fn ensure_editable(&self, id: &TaskId) -> Result<(), TaskError> {
        match self.get(id) {
            None => Err(TaskError::TaskNotFound(id.to_string())),
            Some(task) if task.is_deleted() => Err(TaskError::Deleted(id.to_string())),
            Some(_) => Ok(()),
        }
    }

    fn mutate<F>(&mut self, id: &TaskId, apply: F) -> Result<Task, TaskError>
    where
        F: FnOnce(&mut Task, i64) -> Result<(), TaskError>,
    {
        self.ensure_editable(id)?;
        let slot = self
            .document
            .tasks
            .iter()
            .position(|t| t.id == *id)
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))?;

        let now = self.stamp(self.document.tasks[slot].updated_at);
        let mut edited = self.document.tasks[slot].clone();
        apply(&mut edited, now)?;
        edited.updated_at = now;
        self.document.tasks[slot] = edited.clone();

        self.publish();
        Ok(edited)
    }

    /// Returns a stamp strictly greater than both the last issued stamp and
    /// `floor`.
    fn stamp(&mut self, floor: i64) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let stamp = now
            .max(self.last_stamp.saturating_add(1))
            .max(floor.saturating_add(1));
        self.last_stamp = stamp;
        stamp
    }

    fn observe_stamps(&mut self) {
        if let Some(max) = self.document.tasks.iter().map(|t| t.updated_at).max() {
            self.last_stamp = self.last_stamp.max(max);
        }
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(TaskSnapshot::from(self.document.tasks.clone()));
    }
}

fn clean_title(raw: &str) -> Result<String, TaskError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    Ok(trimmed.to_uppercase())
}

fn clean_project(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_PROJECT.to_string()
    } else {
        trimmed.to_uppercase()
    }
}

fn apply_status(task: &mut Task, status: Status, now: i64) {
    if status == Status::Done {
        if task.status != Status::Done || task.completed_at.is_none() {
            task.completed_at = Some(now);
        }
    } else {
        task.completed_at = None;
    }
    task.status = status;
}
