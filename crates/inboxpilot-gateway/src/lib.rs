//! # InboxPilot Gateway
//! Axum HTTP server: receives Todoist webhooks, filters duplicates, and
//! schedules rule execution in the background.

pub mod executor;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
