//! Todoist entity and webhook payload types.
//!
//! These mirror the external API's JSON shapes; Todoist owns the contract,
//! we only read and write the fields the rules touch.

use serde::{Deserialize, Serialize};

/// A to-do item as returned by the Todoist REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub duration: Option<TaskDuration>,
}

impl Task {
    /// Membership check against the label set (order-irrelevant).
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Due-date descriptor. `datetime` stays a string — Todoist returns it in
/// several formats and we only ever write RFC 3339 UTC back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Due {
    pub string: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: String,
}

impl Due {
    /// The exact instant this due date pins, when it pins one. Date-only due
    /// dates and datetimes without an offset yield `None`.
    pub fn instant(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.datetime.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc))
    }
}

fn default_lang() -> String {
    "en".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDuration {
    pub amount: u32,
    pub unit: String,
}

/// A named sub-grouping within a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub project_id: String,
}

/// A top-level container for tasks and sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Task snapshot carried inside a webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTask {
    pub id: String,
    pub project_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// What to write into a task's due field.
///
/// Natural-language strings are parsed by Todoist itself; absolute instants
/// are computed locally (relative "+N unit" offsets) and written as UTC.
#[derive(Debug, Clone, PartialEq)]
pub enum DueSpec {
    Natural {
        string: String,
        lang: String,
    },
    Absolute {
        datetime: chrono::DateTime<chrono::Utc>,
    },
}

/// Inbound webhook event. Recognized `event_name` values are
/// `item:added` and `item:updated`; anything else is acknowledged and ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_name: String,
    pub user_id: String,
    pub event_data: WebhookTask,
}

impl WebhookEvent {
    pub fn is_item_event(&self) -> bool {
        matches!(self.event_name.as_str(), "item:added" | "item:updated")
    }
}
