//! # InboxPilot Rules
//! The decision layer: pure rule resolution, relative due-date arithmetic,
//! and the time-windowed dedup cache.

pub mod dedup;
pub mod due;
pub mod resolver;

pub use dedup::DedupCache;
pub use resolver::{Action, TaskView, resolve};
