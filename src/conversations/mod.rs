//! Conversation state: entities, file-backed store, idle watcher, and the
//! multiplexer coordinating processes, parsing, and permissions per
//! conversation.

pub mod idle;
pub mod model;
pub mod multiplexer;
pub mod store;

pub use model::{Conversation, ConversationMessage, MessageKind};
pub use multiplexer::{Command, ConversationMultiplexer, UiEvent};
pub use store::{ConversationStore, ConversationSummary};
