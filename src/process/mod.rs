//! Process lifecycle: agent spawning, per-conversation registry, and
//! platform-compatibility indirection.

pub mod compat;
pub mod manager;
pub mod spawner;

pub use manager::{ProcessEvent, ProcessHandle, ProcessManager};
pub use spawner::SpawnConfig;
