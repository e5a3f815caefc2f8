//! # InboxPilot Core
//! Shared types, configuration, and the error taxonomy.

pub mod config;
pub mod error;
pub mod types;

pub use config::PilotConfig;
pub use error::{PilotError, Result};
