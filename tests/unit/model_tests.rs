//! Unit tests for the conversation model.

use serde_json::json;

use agent_console::conversations::{Conversation, MessageKind};

#[test]
fn new_conversations_start_empty_and_active() {
    let conversation = Conversation::new();

    assert!(!conversation.id.is_empty());
    assert!(conversation.session_id.is_none());
    assert!(conversation.messages.is_empty());
    assert!(conversation.is_active);
    assert!(!conversation.processing);
    assert_eq!(conversation.total_tokens_input, 0);
    assert!(conversation.streaming_buffer.is_empty());
}

#[test]
fn generated_ids_are_unique() {
    assert_ne!(Conversation::new().id, Conversation::new().id);
}

#[test]
fn append_preserves_order() {
    let mut conversation = Conversation::new();
    conversation.append(MessageKind::User, json!({ "text": "first" }));
    conversation.append(MessageKind::Assistant, json!({ "text": "second" }));

    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.messages[0].kind, MessageKind::User);
    assert_eq!(conversation.messages[1].kind, MessageKind::Assistant);
}

/// Finalizing commits the buffer as exactly one assistant entry; a
/// second call with the now-empty buffer commits nothing.
#[test]
fn finalize_partial_commits_once() {
    let mut conversation = Conversation::new();
    conversation.streaming_buffer = "Working on it...".into();

    assert!(conversation.finalize_partial());
    assert!(!conversation.finalize_partial());

    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].kind, MessageKind::Assistant);
    assert_eq!(
        conversation.messages[0].payload,
        json!({ "text": "Working on it..." })
    );
    assert!(conversation.streaming_buffer.is_empty());
}

#[test]
fn title_comes_from_the_first_user_message() {
    let mut conversation = Conversation::new();
    conversation.append(MessageKind::Error, json!({ "message": "noise" }));
    conversation.append(MessageKind::User, json!({ "text": "refactor the parser" }));

    assert_eq!(conversation.title(), "refactor the parser");
}

#[test]
fn title_truncates_to_sixty_four_chars() {
    let mut conversation = Conversation::new();
    conversation.append(MessageKind::User, json!({ "text": "x".repeat(100) }));
    assert_eq!(conversation.title().chars().count(), 64);
}

#[test]
fn empty_conversation_gets_a_placeholder_title() {
    assert_eq!(Conversation::new().title(), "(empty conversation)");
}

/// Transient turn state never round-trips through serialization.
#[test]
fn streaming_state_is_not_serialized() {
    let mut conversation = Conversation::new();
    conversation.streaming_buffer = "partial".into();
    conversation.processing = true;

    let raw = serde_json::to_string(&conversation).expect("serialize");
    let restored: Conversation = serde_json::from_str(&raw).expect("deserialize");

    assert!(restored.streaming_buffer.is_empty());
    assert!(!restored.processing);
    assert_eq!(restored.id, conversation.id);
}
