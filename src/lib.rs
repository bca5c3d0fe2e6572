#![forbid(unsafe_code)]

//! Concurrent conversation engine for headless CLI agents.
//!
//! Spawns one agent subprocess per in-flight conversation turn, parses the
//! agent's newline-delimited JSON stream into typed events, mediates
//! tool-permission requests through a persisted exact-match ruleset, and
//! partitions all per-conversation state so any number of turns can run
//! concurrently without interference.

pub mod config;
pub mod conversations;
pub mod errors;
pub mod permissions;
pub mod process;
pub mod protocol;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
