//! Rolling conversation memory with threshold-triggered summarization.
//!
//! Every chat keeps its raw turns plus at most one summary. Once enough user
//! turns pile up, the dispatcher asks for a summary: the summarizer digests
//! the raw turns, the new summary replaces the old one, and only the last
//! few turns survive. Provider context is then `[summary as a system turn,
//! surviving turns...]`.

use crate::config::MemoryConfig;
use crate::core_types::Message;
use crate::llm::Summarizer;
use crate::memory::{Conversation, MemoryStore};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

const SUMMARY_PREVIEW_CHARS: usize = 100;

/// Lightweight view of one conversation for `/stats` and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub message_count: usize,
    pub has_summary: bool,
    pub messages_length: usize,
    pub summary_length: usize,
}

pub struct ConversationMemoryManager {
    store: Arc<MemoryStore>,
    summarizer: Summarizer,
    conversations: Mutex<HashMap<String, Conversation>>,
    max_messages_before_summary: usize,
    keep_last_messages: usize,
    persist_every_turn: bool,
}

impl ConversationMemoryManager {
    pub fn new(store: Arc<MemoryStore>, summarizer: Summarizer) -> Self {
        let defaults = MemoryConfig::default();
        Self {
            store,
            summarizer,
            conversations: Mutex::new(HashMap::new()),
            max_messages_before_summary: defaults.max_messages_before_summary,
            keep_last_messages: defaults.keep_last_messages,
            persist_every_turn: defaults.persist_every_turn,
        }
    }

    pub fn from_config(config: &MemoryConfig, store: Arc<MemoryStore>, summarizer: Summarizer) -> Self {
        Self::new(store, summarizer)
            .with_thresholds(config.max_messages_before_summary, config.keep_last_messages)
            .with_persist_every_turn(config.persist_every_turn)
    }

    pub fn with_thresholds(mut self, max_messages_before_summary: usize, keep_last_messages: usize) -> Self {
        self.max_messages_before_summary = max_messages_before_summary.max(1);
        self.keep_last_messages = keep_last_messages.max(1);
        self
    }

    pub fn with_persist_every_turn(mut self, persist: bool) -> Self {
        self.persist_every_turn = persist;
        self
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Record a user turn. Returns `true` when the conversation has reached
    /// the summarization threshold. Blank text is ignored.
    pub async fn add_user_message(&self, conversation_id: &str, text: &str) -> bool {
        if text.trim().is_empty() {
            debug!("Ignoring empty user message for conversation {}", conversation_id);
            return false;
        }

        let (snapshot, should_summarize) = {
            let mut conversations = self.conversations();
            let conversation = self.get_or_create(&mut conversations, conversation_id);
            conversation.messages.push(Message::user(text));
            conversation.message_count += 1;
            (
                conversation.clone(),
                conversation.message_count >= self.max_messages_before_summary,
            )
        };

        debug!(
            "Conversation {}: {} user turns since last summary",
            conversation_id, snapshot.message_count
        );
        self.write_through(conversation_id, snapshot).await;
        should_summarize
    }

    /// Record an assistant turn. Unknown conversations are left alone.
    pub async fn add_assistant_message(&self, conversation_id: &str, text: &str) {
        let snapshot = {
            let mut conversations = self.conversations();
            match self.get_existing(&mut conversations, conversation_id) {
                Some(conversation) => {
                    conversation.messages.push(Message::assistant(text));
                    conversation.clone()
                }
                None => {
                    debug!(
                        "Dropping assistant turn for unknown conversation {}",
                        conversation_id
                    );
                    return;
                }
            }
        };

        self.write_through(conversation_id, snapshot).await;
    }

    /// Ordered turns to send to a provider: the summary (if any) as a leading
    /// system turn, then the raw turns. Unknown conversations yield nothing.
    pub fn get_context_for_provider(&self, conversation_id: &str) -> Vec<Message> {
        let Some(conversation) = self.lookup(conversation_id) else {
            return Vec::new();
        };

        let mut context = Vec::with_capacity(conversation.messages.len() + 1);
        if let Some(summary) = &conversation.summary {
            context.push(Message::system(format!(
                "Previous conversation context (summary): {}\n\n\
                 Use this information to understand the context, but answer the user's current question.",
                summary
            )));
        }
        context.extend(conversation.messages);
        context
    }

    /// Summarize the raw turns and collapse the history to the last
    /// `keep_last_messages` of them. On failure the conversation is left
    /// exactly as it was and `None` is returned.
    pub async fn create_summary(&self, conversation_id: &str) -> Option<String> {
        let turns = {
            let mut conversations = self.conversations();
            match self.get_existing(&mut conversations, conversation_id) {
                Some(conversation) if !conversation.messages.is_empty() => {
                    conversation.messages.clone()
                }
                _ => {
                    debug!("Nothing to summarize for conversation {}", conversation_id);
                    return None;
                }
            }
        };

        let Some(summary) = self.summarizer.summarize(&turns).await else {
            warn!(
                "Summary for conversation {} failed; keeping {} turns as they are",
                conversation_id,
                turns.len()
            );
            return None;
        };

        let snapshot = {
            let mut conversations = self.conversations();
            let Some(conversation) = conversations.get_mut(conversation_id) else {
                info!(
                    "Conversation {} was cleared while summarizing; dropping the summary",
                    conversation_id
                );
                return None;
            };

            let summarized = turns.len();
            let prefix_intact = conversation.messages.len() >= summarized
                && conversation.messages[..summarized] == turns[..];
            if !prefix_intact {
                warn!(
                    "Conversation {} changed underneath its summary; dropping it",
                    conversation_id
                );
                return None;
            }

            // turns appended while the summarizer ran sit after the prefix and survive
            let drop_count = summarized.saturating_sub(self.keep_last_messages);
            conversation.messages.drain(..drop_count);
            conversation.summary = Some(summary.clone());
            conversation.message_count = conversation.messages.len();
            conversation.clone()
        };

        self.store.set_conversation(conversation_id, snapshot);
        if !self.store.save().await {
            warn!(
                "Summary for conversation {} is only held in memory until the next successful save",
                conversation_id
            );
        }

        info!(
            "Summary created for conversation {}: {}",
            conversation_id,
            preview(&summary)
        );
        Some(summary)
    }

    /// Forget a conversation entirely. Clearing an unknown id is a no-op.
    pub async fn clear_conversation(&self, conversation_id: &str) {
        let in_memory = self.conversations().remove(conversation_id).is_some();
        let in_store = self.store.delete_conversation(conversation_id);

        if in_memory || in_store {
            self.store.save().await;
            info!("Conversation {} cleared", conversation_id);
        } else {
            debug!("Conversation {} had nothing to clear", conversation_id);
        }
    }

    pub fn get_stats(&self, conversation_id: &str) -> Option<ConversationStats> {
        self.lookup(conversation_id).map(|conversation| ConversationStats {
            message_count: conversation.message_count,
            has_summary: conversation.summary.is_some(),
            messages_length: conversation.messages.len(),
            summary_length: conversation
                .summary
                .as_deref()
                .map(|s| s.chars().count())
                .unwrap_or(0),
        })
    }

    /// Flush the store now, regardless of the per-turn policy.
    pub async fn persist(&self) -> bool {
        self.store.save().await
    }

    /// Ids known either in memory or in the store, sorted.
    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: BTreeSet<String> = self.conversations().keys().cloned().collect();
        ids.extend(self.store.conversation_ids());
        ids.into_iter().collect()
    }

    async fn write_through(&self, conversation_id: &str, snapshot: Conversation) {
        self.store.set_conversation(conversation_id, snapshot);
        if self.persist_every_turn {
            self.store.save().await;
        }
    }

    /// Returns the in-memory record, hydrating it from the store on first use.
    fn get_existing<'a>(
        &self,
        conversations: &'a mut HashMap<String, Conversation>,
        conversation_id: &str,
    ) -> Option<&'a mut Conversation> {
        if !conversations.contains_key(conversation_id) {
            let stored = self.store.get_conversation(conversation_id)?;
            conversations.insert(conversation_id.to_string(), stored);
        }
        conversations.get_mut(conversation_id)
    }

    fn get_or_create<'a>(
        &self,
        conversations: &'a mut HashMap<String, Conversation>,
        conversation_id: &str,
    ) -> &'a mut Conversation {
        if !conversations.contains_key(conversation_id) {
            let stored = self.store.get_conversation(conversation_id).unwrap_or_default();
            conversations.insert(conversation_id.to_string(), stored);
        }
        conversations.entry(conversation_id.to_string()).or_default()
    }

    fn lookup(&self, conversation_id: &str) -> Option<Conversation> {
        if let Some(conversation) = self.conversations().get(conversation_id) {
            return Some(conversation.clone());
        }
        self.store.get_conversation(conversation_id)
    }

    fn conversations(&self) -> MutexGuard<'_, HashMap<String, Conversation>> {
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn preview(summary: &str) -> String {
    let mut preview: String = summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    if summary.chars().count() > SUMMARY_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
