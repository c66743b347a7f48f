//! Conversation memory: per-chat turn logs, threshold-triggered summaries
//! and their JSON-file persistence.
//!
//! `MemoryStore` owns the durable map, `ConversationMemoryManager` owns the
//! rolling window and the summarization lifecycle, and `ConversationLocks`
//! serializes turns of the same conversation.

pub mod locks;
pub mod manager;
pub mod store;

use crate::core_types::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use locks::ConversationLocks;
pub use manager::{ConversationMemoryManager, ConversationStats};
pub use store::{LoadOutcome, MemoryStats, MemoryStore};

/// Everything remembered about one chat. This is also the persisted record,
/// keyed by conversation id in the store file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub summary: Option<String>,
    /// User turns added since the last summary reset.
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.summary.is_none()
    }
}
