//! File-backed conversation persistence.
//!
//! One JSON file per conversation (`<id>.json`) holding the session id,
//! timestamps, cumulative totals, and the ordered message log. A separate
//! `index.json` maps conversation id to summary metadata so listings never
//! load full transcripts. Conversations are never deleted — beyond the
//! configured count they are marked archived in the index and their files
//! kept.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::conversations::model::Conversation;
use crate::{AppError, Result};

/// Summary metadata kept in the index for listing without full load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ConversationSummary {
    /// Conversation identifier (also the file stem).
    pub id: String,
    /// Title derived from the first user message.
    pub title: String,
    /// Agent session handle, when one was issued.
    pub session_id: Option<String>,
    /// Creation timestamp.
    pub start_time: DateTime<Utc>,
    /// Most recent turn-end timestamp.
    pub end_time: Option<DateTime<Utc>>,
    /// Number of log entries.
    pub message_count: usize,
    /// Cumulative cost in USD.
    pub total_cost: f64,
    /// Whether the conversation was pruned out of active listings.
    pub archived: bool,
}

/// File-per-conversation store with an index for listings.
#[derive(Debug)]
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] when the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|err| AppError::Store(format!("cannot create conversation dir: {err}")))?;
        Ok(Self { dir })
    }

    /// Persist one conversation and refresh its index entry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] on serialisation or write failure.
    pub async fn save(&self, conversation: &Conversation) -> Result<()> {
        let raw = serde_json::to_string_pretty(conversation)
            .map_err(|err| AppError::Store(format!("cannot serialise conversation: {err}")))?;
        fs::write(self.conversation_path(&conversation.id), raw)
            .await
            .map_err(|err| AppError::Store(format!("cannot write conversation: {err}")))?;

        let mut index = self.read_index().await;
        let archived = index
            .get(&conversation.id)
            .is_some_and(|entry| entry.archived);
        index.insert(conversation.id.clone(), summarize(conversation, archived));
        self.write_index(&index).await
    }

    /// Load a full conversation by id.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] when no file exists for `id` and
    /// [`AppError::Store`] when the file cannot be parsed.
    pub async fn load(&self, id: &str) -> Result<Conversation> {
        let path = self.conversation_path(id);
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|_| AppError::NotFound(format!("conversation {id} not found")))?;
        serde_json::from_str(&raw)
            .map_err(|err| AppError::Store(format!("conversation {id} is corrupt: {err}")))
    }

    /// List summaries for all non-archived conversations, newest first.
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = self
            .read_index()
            .await
            .into_values()
            .filter(|entry| !entry.archived)
            .collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        summaries
    }

    /// Archive conversations beyond `max` most-recent ones.
    ///
    /// Files are kept; only the index entries flip to archived. Returns
    /// the number of conversations newly archived.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] when the index cannot be rewritten.
    pub async fn prune_to(&self, max: usize) -> Result<usize> {
        let mut index = self.read_index().await;

        let mut active: Vec<(String, DateTime<Utc>)> = index
            .iter()
            .filter(|(_, entry)| !entry.archived)
            .map(|(id, entry)| (id.clone(), entry.start_time))
            .collect();
        active.sort_by(|a, b| b.1.cmp(&a.1));

        let overflow: Vec<String> = active.into_iter().skip(max).map(|(id, _)| id).collect();
        if overflow.is_empty() {
            return Ok(0);
        }

        for id in &overflow {
            if let Some(entry) = index.get_mut(id) {
                entry.archived = true;
            }
        }
        self.write_index(&index).await?;
        Ok(overflow.len())
    }

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join("index.json")
    }

    async fn read_index(&self) -> BTreeMap<String, ConversationSummary> {
        match fs::read_to_string(self.index_path()).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(index) => index,
                Err(err) => {
                    warn!(%err, "conversation index is corrupt, rebuilding from empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        }
    }

    async fn write_index(&self, index: &BTreeMap<String, ConversationSummary>) -> Result<()> {
        let raw = serde_json::to_string_pretty(index)
            .map_err(|err| AppError::Store(format!("cannot serialise index: {err}")))?;
        fs::write(self.index_path(), raw)
            .await
            .map_err(|err| AppError::Store(format!("cannot write index: {err}")))
    }
}

/// Build the index entry for a conversation.
fn summarize(conversation: &Conversation, archived: bool) -> ConversationSummary {
    ConversationSummary {
        id: conversation.id.clone(),
        title: conversation.title(),
        session_id: conversation.session_id.clone(),
        start_time: conversation.start_time,
        end_time: conversation.end_time,
        message_count: conversation.messages.len(),
        total_cost: conversation.total_cost,
        archived,
    }
}
