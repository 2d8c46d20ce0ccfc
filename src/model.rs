//! The synchronized application document.
//!
//! [`AppState`] is the single JSON document stored per client identity. Its
//! wire format uses camelCase field names and a mandatory `version` tag.
//! Documents arriving from outside the process (remote load, local file,
//! import) go through [`AppState::from_value`] and [`AppState::normalized`]
//! so downstream code never sees missing mappings, negative minutes, or
//! entries for deleted tasks.

use crate::timekey::TimeKeys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current document format tag.
pub const STATE_VERSION: u32 = 1;

/// Target assigned to a weekly task when it is created (10 hours).
pub const DEFAULT_WEEKLY_TARGET_MIN: u32 = 10 * 60;

/// Opaque task identifier.
pub type TaskId = String;

/// Whether a task resets daily or accumulates minutes weekly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Daily,
    Weekly,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

/// A tracked task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Generated client-side at creation; never changes.
    pub id: TaskId,
    /// Non-empty, trimmed.
    pub title: String,
    /// Fixed at creation.
    pub kind: TaskKind,
    /// Creation time in epoch milliseconds. Informational only.
    #[serde(default)]
    pub created_at: i64,
}

impl Task {
    /// Create a task with a fresh id. Returns `None` for a blank title.
    pub fn new(title: &str, kind: TaskKind, created_at: DateTime<Utc>) -> Option<Self> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_owned(),
            kind,
            created_at: created_at.timestamp_millis(),
        })
    }
}

/// Why an incoming document was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// Not a JSON object of the expected shape.
    #[error("malformed state document: {0}")]
    Malformed(String),
    /// `version` missing or not equal to [`STATE_VERSION`].
    #[error("unsupported state version {found} (expected {})", STATE_VERSION)]
    Version { found: String },
}

/// The whole synchronized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub version: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<Task>,
    /// `YYYY-MM-DD` in the reference zone.
    #[serde(default, deserialize_with = "null_as_default")]
    pub today_key: String,
    /// Daily task id → done today. Absent means not done.
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily_done: BTreeMap<TaskId, bool>,
    /// `{ISOYear}-W{ww}` in the reference zone.
    #[serde(default, deserialize_with = "null_as_default")]
    pub week_key: String,
    /// Weekly task id → target minutes. Survives week rollover.
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub weekly_target_min: BTreeMap<TaskId, u32>,
    /// Weekly task id → minutes spent this week.
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub weekly_spent_min: BTreeMap<TaskId, u32>,
}

impl AppState {
    /// An empty document for the period described by `keys`.
    pub fn blank(keys: &TimeKeys) -> Self {
        Self {
            version: STATE_VERSION,
            tasks: Vec::new(),
            today_key: keys.day.clone(),
            daily_done: BTreeMap::new(),
            week_key: keys.week.clone(),
            weekly_target_min: BTreeMap::new(),
            weekly_spent_min: BTreeMap::new(),
        }
    }

    /// Decode a document, checking the version tag before anything else.
    ///
    /// Accepts the document either as a JSON object or as a string holding
    /// JSON-encoded text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] when the payload is not an object, the
    /// version is not [`STATE_VERSION`], or a field has the wrong shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self, DocumentError> {
        let value = match value {
            serde_json::Value::String(text) => serde_json::from_str(&text)
                .map_err(|e| DocumentError::Malformed(format!("embedded JSON: {e}")))?,
            other => other,
        };

        let Some(object) = value.as_object() else {
            return Err(DocumentError::Malformed(
                "expected a JSON object".to_owned(),
            ));
        };

        match object.get("version") {
            Some(v) if v.as_u64() == Some(u64::from(STATE_VERSION)) => {}
            Some(v) => return Err(DocumentError::Version { found: v.to_string() }),
            None => {
                return Err(DocumentError::Version {
                    found: "none".to_owned(),
                });
            }
        }

        serde_json::from_value(value).map_err(|e| DocumentError::Malformed(e.to_string()))
    }

    /// Decode from JSON text. See [`AppState::from_value`].
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Malformed`] for invalid JSON.
    pub fn from_json(text: &str) -> Result<Self, DocumentError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| DocumentError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Repair a document that came from outside the engine.
    ///
    /// Trims titles, drops tasks with blank titles, removes mapping entries
    /// for unknown task ids, and gives weekly tasks without a target the
    /// default one.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for task in &mut self.tasks {
            let trimmed = task.title.trim();
            if trimmed.len() != task.title.len() {
                task.title = trimmed.to_owned();
            }
        }
        self.tasks.retain(|t| !t.title.is_empty() && !t.id.is_empty());

        let known = |id: &TaskId, tasks: &[Task]| tasks.iter().any(|t| &t.id == id);
        let tasks = &self.tasks;
        self.daily_done.retain(|id, _| known(id, tasks));
        self.weekly_target_min.retain(|id, _| known(id, tasks));
        self.weekly_spent_min.retain(|id, _| known(id, tasks));

        for task in self.tasks.iter().filter(|t| t.kind == TaskKind::Weekly) {
            self.weekly_target_min
                .entry(task.id.clone())
                .or_insert(DEFAULT_WEEKLY_TARGET_MIN);
        }
        self
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn tasks_of_kind(&self, kind: TaskKind) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.kind == kind)
    }

    pub fn is_done_today(&self, id: &str) -> bool {
        self.daily_done.get(id).copied().unwrap_or(false)
    }

    pub fn spent_min(&self, id: &str) -> u32 {
        self.weekly_spent_min.get(id).copied().unwrap_or(0)
    }

    pub fn target_min(&self, id: &str) -> u32 {
        self.weekly_target_min.get(id).copied().unwrap_or(0)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept any JSON number, round, and clamp into `0..=u32::MAX`.
/// Non-numeric and non-finite entries are dropped.
fn lenient_minutes<'de, D>(deserializer: D) -> Result<BTreeMap<TaskId, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<TaskId, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(id, value)| {
            let n = value.as_f64().filter(|n| n.is_finite())?;
            let minutes = n.round().clamp(0.0, f64::from(u32::MAX)) as u32;
            Some((id, minutes))
        })
        .collect())
}
