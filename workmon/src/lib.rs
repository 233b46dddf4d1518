//! Library for workmon: read-only status of workmon_agent checkpoints.

pub mod error;
pub mod history;
pub mod render;
pub mod status;
pub mod types;
pub mod watch;
