//! Permission control-loop: persisted exact-match trust rules and the
//! per-request approve/deny/question state machine.

pub mod handler;
pub mod rules;

pub use handler::{PendingPermissionRequest, PermissionHandler, PermissionPrompt, RequestKind};
pub use rules::{PermissionRule, RuleSet};
