//! Record normalizer: turns any JSON value into a current-schema [`Task`].
//!
//! Records in the shared document come from older application versions,
//! from imports, and from hand edits. Normalization never fails; every
//! missing or malformed field is replaced by a defined default so one bad
//! record can never abort loading the rest of the collection.
//!
//! Repairs applied here:
//!
//! - orphaned ownership (`createdBy` / `assignedTo` missing or `"unassigned"`)
//!   is attributed to the user performing the load, each field independently;
//! - the three historical Gantt-day shapes (bare date string, `{date, userId}`,
//!   `{date, userIds}`) collapse into `{date, userIds?}`;
//! - records and subtasks without ids get ids derived from their content, so
//!   every instance reading the same legacy record assigns the same id;
//! - done tasks without `completedAt` get it backfilled from `updatedAt`.
//!
//! Normalizing an already normalized task is a no-op.

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::task::{
    DEFAULT_PROJECT, DEFAULT_TITLE, GanttDay, Priority, Status, Subtask, Task, TaskId, UNASSIGNED,
};

/// Inputs that are not part of the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeContext {
    /// User to attribute orphaned ownership to.
    pub fallback_user_id: Option<String>,
    /// Clock reading used for missing timestamps (ms since epoch).
    pub now_ms: i64,
}

impl NormalizeContext {
    /// Creates a context with an explicit clock reading.
    #[must_use]
    pub const fn new(fallback_user_id: Option<String>, now_ms: i64) -> Self {
        Self {
            fallback_user_id,
            now_ms,
        }
    }

    /// Creates a context reading the wall clock.
    #[must_use]
    pub fn at_now(fallback_user_id: Option<String>) -> Self {
        Self::new(fallback_user_id, chrono::Utc::now().timestamp_millis())
    }

    fn fallback(&self) -> Option<&str> {
        self.fallback_user_id
            .as_deref()
            .filter(|user| !user.is_empty() && *user != UNASSIGNED)
    }
}

/// Normalizes one arbitrary value into a well-formed task.
#[must_use]
pub fn normalize_task(value: &Value, ctx: &NormalizeContext) -> Task {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let id = TaskId::from(read_id(obj.get("id")).unwrap_or_else(|| legacy_task_id(value)));
    let created_at = obj.get("createdAt").and_then(read_millis).unwrap_or(ctx.now_ms);
    let updated_at = obj.get("updatedAt").and_then(read_millis).unwrap_or(created_at);

    let status = read_str(obj.get("status"))
        .and_then(parse_status)
        .unwrap_or_default();
    let completed_at = obj
        .get("completedAt")
        .and_then(read_millis)
        .or_else(|| (status == Status::Done).then_some(updated_at));

    let subtasks = read_subtasks(obj.get("subtasks"), id.as_str(), created_at);

    Task {
        id,
        title: read_label(obj.get("title"), DEFAULT_TITLE),
        project: read_label(obj.get("project"), DEFAULT_PROJECT),
        due_date: obj.get("dueDate").and_then(read_date),
        priority: read_str(obj.get("priority"))
            .and_then(parse_priority)
            .unwrap_or_default(),
        status,
        assigned_to: repair_assignees(read_assignees(obj.get("assignedTo")), ctx),
        created_by: repair_creator(read_str(obj.get("createdBy")), ctx),
        notes: read_str(obj.get("notes")).unwrap_or_default().to_string(),
        favorite: obj.get("favorite").and_then(Value::as_bool).unwrap_or(false),
        archived: obj.get("archived").and_then(Value::as_bool).unwrap_or(false),
        archived_at: obj.get("archivedAt").and_then(read_millis),
        subtasks,
        gantt_days: read_gantt_days(obj.get("ganttDays")),
        created_at,
        updated_at,
        completed_at,
        deleted_at: obj.get("deletedAt").and_then(read_millis),
    }
}

/// Normalizes every value of a collection.
#[must_use]
pub fn normalize_all(values: &[Value], ctx: &NormalizeContext) -> Vec<Task> {
    values.iter().map(|v| normalize_task(v, ctx)).collect()
}

/// Parses a priority name leniently (case-insensitive, legacy aliases).
#[must_use]
pub fn parse_priority(raw: &str) -> Option<Priority> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Some(Priority::Low),
        "med" | "medium" | "normal" => Some(Priority::Med),
        "high" | "urgent" => Some(Priority::High),
        _ => None,
    }
}

/// Parses a status name leniently (case-insensitive, legacy aliases).
#[must_use]
pub fn parse_status(raw: &str) -> Option<Status> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "todo" | "to-do" | "to_do" | "open" => Some(Status::Todo),
        "doing" | "in-progress" | "in_progress" | "inprogress" => Some(Status::Doing),
        "review" | "in-review" | "in_review" => Some(Status::Review),
        "done" | "completed" | "complete" => Some(Status::Done),
        _ => None,
    }
}

fn read_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str)
}

fn read_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Prefix of ids assigned to records that arrived without one.
pub const LEGACY_ID_PREFIX: &str = "legacy-";

/// Id for a record that has none, stable across loads and instances.
///
/// Only the fields an edit is unlikely to touch feed the hash, so a legacy
/// record keeps its id when another writer bumps its status or timestamps.
fn legacy_task_id(value: &Value) -> String {
    let identity = value.as_object().map_or_else(
        || vec![value],
        |obj| {
            ["title", "createdAt", "createdBy", "project", "notes"]
                .iter()
                .map(|key| obj.get(*key).unwrap_or(&Value::Null))
                .collect()
        },
    );
    content_id(&identity)
}

fn content_id(parts: &[&Value]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.to_string().as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    format!("{LEGACY_ID_PREFIX}{}", hex::encode(&digest[..12]))
}

fn read_label(value: Option<&Value>, default: &str) -> String {
    read_str(value)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| default.to_string(), |s| s.to_uppercase().trim().to_string())
}

/// Reads a millisecond timestamp from a number, a numeric string, or an
/// RFC 3339 string written by older versions.
#[allow(clippy::cast_possible_truncation)]
fn read_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    }
}

fn read_date(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        raw.get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
    })
}

fn read_assignees(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(single)) if !single.trim().is_empty() => {
            vec![single.trim().to_string()]
        }
        _ => Vec::new(),
    }
}

fn repair_assignees(assignees: Vec<String>, ctx: &NormalizeContext) -> Vec<String> {
    let orphaned = assignees.iter().all(|user| user == UNASSIGNED);
    match ctx.fallback() {
        Some(fallback) if orphaned => vec![fallback.to_string()],
        _ => assignees,
    }
}

fn repair_creator(creator: Option<&str>, ctx: &NormalizeContext) -> String {
    let creator = creator.map(str::trim).filter(|s| !s.is_empty());
    match creator {
        Some(user) if user != UNASSIGNED => user.to_string(),
        _ => ctx.fallback().unwrap_or(UNASSIGNED).to_string(),
    }
}

fn read_subtasks(
    value: Option<&Value>,
    parent_id: &str,
    parent_created_at: i64,
) -> Vec<Subtask> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let fallback_id = || {
                content_id(&[
                    &Value::from(parent_id),
                    &Value::from(index),
                    item.get("title").unwrap_or(item),
                ])
            };
            match item {
                Value::Object(obj) => Some(read_subtask(obj, fallback_id, parent_created_at)),
                Value::String(title) => Some(Subtask {
                    id: fallback_id(),
                    title: non_empty_or(title, DEFAULT_TITLE),
                    completed: false,
                    created_at: parent_created_at,
                    completed_at: None,
                }),
                _ => None,
            }
        })
        .collect()
}

fn read_subtask(
    obj: &Map<String, Value>,
    fallback_id: impl FnOnce() -> String,
    parent_created_at: i64,
) -> Subtask {
    Subtask {
        id: read_id(obj.get("id")).unwrap_or_else(fallback_id),
        title: non_empty_or(read_str(obj.get("title")).unwrap_or_default(), DEFAULT_TITLE),
        completed: obj
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        created_at: obj
            .get("createdAt")
            .and_then(read_millis)
            .unwrap_or(parent_created_at),
        completed_at: obj.get("completedAt").and_then(read_millis),
    }
}

fn non_empty_or(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn read_gantt_days(value: Option<&Value>) -> Vec<GanttDay> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().filter_map(read_gantt_day).collect()
}

fn read_gantt_day(item: &Value) -> Option<GanttDay> {
    match item {
        Value::String(date) => {
            let date = date.trim();
            (!date.is_empty()).then(|| GanttDay {
                date: date.to_string(),
                user_ids: None,
            })
        }
        Value::Object(obj) => {
            let date = read_str(obj.get("date"))
                .map(str::trim)
                .filter(|s| !s.is_empty())?;

            let mut users: Vec<String> = Vec::new();
            let multi = obj
                .get("userIds")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str);
            let single = read_str(obj.get("userId")).into_iter();
            for user in multi.chain(single).map(str::trim) {
                if !user.is_empty() && !users.iter().any(|u| u == user) {
                    users.push(user.to_string());
                }
            }

            Some(GanttDay {
                date: date.to_string(),
                user_ids: (!users.is_empty()).then_some(users),
            })
        }
        _ => None,
    }
}
