//! Error taxonomy shared across the workspace.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// All failure modes an action can hit.
///
/// Action-level errors are caught at the spawned-task boundary and logged;
/// they never crash the dispatcher.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("config error: {0}")]
    Config(String),

    /// Referenced task/section/project no longer exists upstream.
    /// Logged, action abandoned, no retry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Upstream throttling. Calls are short-circuited until `reset_at`.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Any other 4xx/5xx or transport failure from the Todoist API.
    #[error("todoist api error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    /// Reminders only make sense on a task that has (or is getting) a due date.
    #[error("reminder needs a scheduled task: {0}")]
    InvalidReminderTarget(String),

    #[error("invalid due spec: {0}")]
    InvalidDueSpec(String),
}

pub type Result<T> = std::result::Result<T, PilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_with_status() {
        let err = PilotError::Api {
            status: Some(503),
            message: "upstream down".into(),
        };
        assert_eq!(err.to_string(), "todoist api error (status 503): upstream down");
    }

    #[test]
    fn test_api_error_display_without_status() {
        let err = PilotError::Api {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "todoist api error: connection reset");
    }
}
