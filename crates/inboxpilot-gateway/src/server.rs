//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use chrono::FixedOffset;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use inboxpilot_core::PilotConfig;
use inboxpilot_rules::DedupCache;
use inboxpilot_todoist::{RateLimitGuard, TodoistClient};

use crate::executor::TaskLocks;

/// Shared state for the gateway server. Dedup cache and rate-limit guard are
/// injected instances scoped to this state, not process globals.
pub struct AppState {
    pub config: PilotConfig,
    pub client: TodoistClient,
    pub guard: RateLimitGuard,
    pub dedup: DedupCache,
    pub locks: TaskLocks,
    pub tz: FixedOffset,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build state from config. Errors on an out-of-range timezone offset.
    pub fn from_config(config: PilotConfig) -> anyhow::Result<Self> {
        let tz = config
            .timezone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow::anyhow!(
                "timezone_offset_minutes {} out of range",
                config.timezone_offset_minutes
            ))?;
        let guard = RateLimitGuard::new();
        let client = TodoistClient::new(
            &config.api_token,
            guard.clone(),
            config.rules.protected_projects.clone(),
        )
        .with_timezone(tz);
        let dedup = DedupCache::new(config.dedup.window_secs, config.dedup.max_entries);
        Ok(Self {
            config,
            client,
            guard,
            dedup,
            locks: TaskLocks::new(),
            tz,
            start_time: std::time::Instant::now(),
        })
    }
}

/// Build the Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/todoist", post(crate::routes::todoist_webhook))
        .route("/health", get(crate::routes::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and serve until shutdown.
pub async fn start(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("gateway listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
