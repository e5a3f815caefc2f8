//! # InboxPilot Todoist
//! Todoist API wrapper: idempotent task mutations plus the shared
//! rate-limit guard every outbound call consults.

pub mod client;
pub mod guard;

pub use client::TodoistClient;
pub use guard::RateLimitGuard;
