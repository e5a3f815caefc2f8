//! Route handlers.
//!
//! The webhook handler answers immediately: the mutating work runs after the
//! response on a spawned task. The caller only ever sees "ok" or a 429 while
//! the rate-limit guard is active; action outcomes are observable in logs.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use inboxpilot_core::types::WebhookEvent;

use crate::executor;
use crate::server::AppState;

/// Inbound Todoist webhook (POST /todoist).
pub async fn todoist_webhook(
    State(state): State<Arc<AppState>>,
    Json(event): Json<WebhookEvent>,
) -> Response {
    let now = Utc::now();

    if let Some(reset_at) = state.guard.active_until(now) {
        tracing::warn!("rejecting webhook, rate limited until {reset_at}");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "ok": false,
                "error": "rate limited",
                "retry_at": reset_at.to_rfc3339(),
            })),
        )
            .into_response();
    }

    if !event.is_item_event() {
        tracing::debug!("ignoring event {}", event.event_name);
        return (StatusCode::OK, "ok").into_response();
    }

    let task = event.event_data;
    if !state.dedup.should_process(&task.id, now) {
        tracing::info!("skipping task {}, processed recently", task.id);
        return (StatusCode::OK, "ok").into_response();
    }

    tracing::info!(
        "task {} {} in project {}, section {}",
        task.id,
        event.event_name.split(':').nth(1).unwrap_or("event"),
        task.project_id,
        task.section_id.as_deref().unwrap_or("-")
    );

    if task.section_id.is_some() {
        tokio::spawn(executor::process_event(state.clone(), task));
    }

    (StatusCode::OK, "ok").into_response()
}

/// Health check (GET /health).
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "rate_limited": state.guard.active_until(Utc::now()).is_some(),
        "dedup_entries": state.dedup.len(),
    }))
}
