//! The whole persisted document shared between application instances.
//!
//! Every top-level key is optional on disk; an absent key means "not yet
//! populated". Tasks are run through the normalizer on the way in. The
//! remaining keys are document settings, replaced as whole values.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::normalize::{NormalizeContext, normalize_all};
use crate::task::Task;

/// Errors produced while decoding or encoding a document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The bytes are not valid JSON.
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    /// All tasks, tombstones included.
    pub tasks: Vec<Task>,
    /// Project name to folder path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directories: Option<BTreeMap<String, String>>,
    /// Recently used project names, most recent first, deduplicated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_history: Option<Vec<String>>,
    /// Project name to palette index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_colors: Option<BTreeMap<String, u32>>,
    /// Flat notification settings object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<Map<String, Value>>,
    /// Flat theme settings object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_settings: Option<Map<String, Value>>,
}

impl TaskDocument {
    /// Creates a document holding only tasks.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// Decodes a document, normalizing every task record.
    ///
    /// A root that is not an object yields an empty document; malformed
    /// settings keys are dropped individually.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] if `bytes` is not valid JSON.
    pub fn from_json_bytes(bytes: &[u8], ctx: &NormalizeContext) -> Result<Self, DocumentError> {
        let root: Value = serde_json::from_slice(bytes)?;
        Ok(Self::from_value(&root, ctx))
    }

    /// Builds a document from an already parsed JSON value.
    #[must_use]
    pub fn from_value(root: &Value, ctx: &NormalizeContext) -> Self {
        let Some(obj) = root.as_object() else {
            return Self::default();
        };
        let tasks = obj
            .get("tasks")
            .and_then(Value::as_array)
            .map(|items| normalize_all(items, ctx))
            .unwrap_or_default();

        Self {
            tasks,
            directories: obj.get("directories").and_then(read_string_map),
            project_history: obj.get("projectHistory").and_then(read_history),
            project_colors: obj.get("projectColors").and_then(read_color_map),
            notification_settings: obj
                .get("notificationSettings")
                .and_then(Value::as_object)
                .cloned(),
            theme_settings: obj.get("themeSettings").and_then(Value::as_object).cloned(),
        }
    }

    /// Encodes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Json`] if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Moves `project` to the front of the project history.
    pub fn remember_project(&mut self, project: &str) {
        let project = project.trim().to_uppercase();
        if project.is_empty() {
            return;
        }
        let history = self.project_history.get_or_insert_with(Vec::new);
        history.retain(|p| *p != project);
        history.insert(0, project);
    }

    /// Takes every settings key `other` has populated, as a whole value.
    pub fn adopt_settings(&mut self, other: &Self) {
        if other.directories.is_some() {
            self.directories.clone_from(&other.directories);
        }
        if other.project_history.is_some() {
            self.project_history.clone_from(&other.project_history);
        }
        if other.project_colors.is_some() {
            self.project_colors.clone_from(&other.project_colors);
        }
        if other.notification_settings.is_some() {
            self.notification_settings
                .clone_from(&other.notification_settings);
        }
        if other.theme_settings.is_some() {
            self.theme_settings.clone_from(&other.theme_settings);
        }
    }

    /// Returns `true` if both documents carry the same settings keys.
    #[must_use]
    pub fn same_settings(&self, other: &Self) -> bool {
        self.directories == other.directories
            && self.project_history == other.project_history
            && self.project_colors == other.project_colors
            && self.notification_settings == other.notification_settings
            && self.theme_settings == other.theme_settings
    }
}

fn read_string_map(value: &Value) -> Option<BTreeMap<String, String>> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| v.as_str().map(|path| (k.clone(), path.to_string())))
            .collect(),
    )
}

fn read_color_map(value: &Value) -> Option<BTreeMap<String, u32>> {
    let obj = value.as_object()?;
    Some(
        obj.iter()
            .filter_map(|(k, v)| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(|n| (k.clone(), n))
            })
            .collect(),
    )
}

fn read_history(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    let mut history: Vec<String> = Vec::with_capacity(items.len());
    for name in items.iter().filter_map(Value::as_str) {
        if !history.iter().any(|p| p == name) {
            history.push(name.to_string());
        }
    }
    Some(history)
}
