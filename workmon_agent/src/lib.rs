//! Library for workmon_agent: the sampling engine, exposed for the binary and tests.

pub mod checkpoint;
pub mod clock;
pub mod collector;
pub mod config;
pub mod demo;
pub mod error;
pub mod output;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod types;
pub mod ws;
