//! Background action executor.
//!
//! Runs after the webhook response is sent. Holds a per-task async lock so
//! mutation sequences for the same task never interleave, resolves the rule
//! table, and applies each action through the client. Errors are logged and
//! the sequence abandoned; nothing here may take the process down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use inboxpilot_core::error::{PilotError, Result};
use inboxpilot_core::types::WebhookTask;
use inboxpilot_rules::{Action, TaskView, resolve};

use crate::server::AppState;

/// Per-task-id locks: at most one mutation sequence in flight per task.
/// Lock objects are created on demand and never removed — a handful of bytes
/// per task id seen, reclaimed on restart like the dedup cache.
pub struct TaskLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn lock_for(&self, task_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.inner.lock().unwrap();
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for a scheduled event. Never panics, never returns an error —
/// this is the catch-and-log boundary.
pub async fn process_event(state: Arc<AppState>, task: WebhookTask) {
    let lock = state.locks.lock_for(&task.id);
    let _in_flight = lock.lock().await;

    match run(&state, &task).await {
        Ok(()) => {}
        Err(PilotError::NotFound(what)) => {
            tracing::warn!("abandoning task {}: {what} vanished upstream", task.id);
        }
        Err(PilotError::RateLimited { reset_at }) => {
            tracing::warn!("abandoning task {}: rate limited until {reset_at}", task.id);
        }
        Err(e) => {
            tracing::error!("action failed for task {}: {e}", task.id);
        }
    }
}

async fn run(state: &AppState, task: &WebhookTask) -> Result<()> {
    let Some(section_id) = task.section_id.as_deref() else {
        return Ok(());
    };

    let section = state.client.get_section(section_id).await?;

    // Webhook snapshots usually carry labels; older deliveries do not, and
    // the deferral/move rules need them.
    let labels = if task.labels.is_empty() {
        state.client.get_task(&task.id).await?.labels
    } else {
        task.labels.clone()
    };

    let view = TaskView {
        task_id: &task.id,
        project_id: &task.project_id,
        section_id: &section.id,
        section_name: &section.name,
        labels: &labels,
    };
    let actions = resolve(&state.config.rules, state.tz, Utc::now(), &view);

    apply_actions(state, &task.id, &actions).await
}

/// Apply an ordered action list. Multi-step sequences are not atomic: a
/// failure after a successful step leaves the partial state as-is, logged
/// with the step that broke.
async fn apply_actions(state: &AppState, task_id: &str, actions: &[Action]) -> Result<()> {
    for (step, action) in actions.iter().enumerate() {
        if let Err(e) = apply_one(state, task_id, action).await {
            if step > 0 {
                tracing::error!(
                    "partial failure for task {task_id}: step {} of {} ({action:?}) failed, earlier steps stand",
                    step + 1,
                    actions.len(),
                );
            }
            return Err(e);
        }
    }
    Ok(())
}

async fn apply_one(state: &AppState, task_id: &str, action: &Action) -> Result<()> {
    let client = &state.client;
    match action {
        Action::AddLabel { label } => {
            client.add_label(task_id, label).await?;
        }
        Action::StripLabel { label } => {
            client.remove_label(task_id, label).await?;
        }
        Action::SetDueDate {
            spec,
            duration_minutes,
        } => {
            client.set_due_date(task_id, spec, *duration_minutes).await?;
        }
        Action::AddReminder { minutes_before } => {
            client.add_reminder(task_id, *minutes_before).await?;
        }
        Action::RemoveDueDate => {
            client.remove_due_date(task_id).await?;
        }
        Action::MoveToProject { project_id } => {
            client.move_task(task_id, Some(project_id), None).await?;
        }
        Action::MoveToProjectSection {
            project_id,
            section_name,
        } => {
            let section = client.find_or_create_section(project_id, section_name).await?;
            client
                .move_task(task_id, Some(project_id), Some(&section.id))
                .await?;
        }
        Action::NoOp { reason } => {
            tracing::info!("skipped task {task_id}: {reason}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_locks_are_per_id() {
        let locks = TaskLocks::new();
        let a1 = locks.lock_for("a");
        let a2 = locks.lock_for("a");
        let b = locks.lock_for("b");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_same_task_serializes() {
        let locks = TaskLocks::new();
        let lock = locks.lock_for("a");
        let held = lock.lock().await;
        // A second attempt on the same id must not acquire immediately.
        let second = locks.lock_for("a");
        assert!(second.try_lock().is_err());
        drop(held);
        assert!(second.try_lock().is_ok());
    }
}
