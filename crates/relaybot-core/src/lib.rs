//! Conversation memory and provider relay for a chat bot.
//!
//! The crate keeps a rolling memory of every chat, compacts it into a short
//! summary once enough user turns accumulate, and relays each turn to a
//! configurable completion provider together with that memory.
//!
//! # Architecture Overview
//!
//! - **Memory**: `memory::MemoryStore` persists conversations to one JSON file,
//!   `memory::ConversationMemoryManager` owns the turn log and summary lifecycle
//! - **Language models**: the `LLM` trait with OpenAI-compatible and YandexGPT
//!   clients, a timeout wrapper and the summarization request builder
//! - **Dispatch**: `dispatcher::Dispatcher` answers slash commands and runs
//!   conversation turns for any transport
//! - **Configuration**: YAML configuration with environment-resolved credentials

pub mod config;
pub mod core_types;
pub mod dispatcher;
pub mod errors;
pub mod format;
pub mod llm;
pub mod memory;

pub use config::*;
pub use dispatcher::{ChatMode, Dispatcher, Reply};
pub use errors::BotError;
pub use format::ResponseFormat;
pub use llm::LLM;
pub use memory::{ConversationMemoryManager, MemoryStore};
