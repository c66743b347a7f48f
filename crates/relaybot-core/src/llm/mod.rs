//! Completion provider abstractions and integrations.
//!
//! Everything the memory layer needs from a model is the `LLM` trait: send an
//! ordered role/content list, get text back. Concrete providers live in
//! `providers`, cross-cutting wrappers (timeouts) next to them, and the
//! summarization request builder in `summarizer`.

pub use crate::core_types::{LLMResponse, Message};
use crate::errors::BotError;
use async_trait::async_trait;

pub mod providers;
pub mod registry;
pub mod summarizer;
pub mod timeout;

pub use registry::ProviderRegistry;
pub use summarizer::Summarizer;
pub use timeout::TimeoutLLM;

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(&self, messages: Vec<Message>) -> Result<LLMResponse, BotError>;
}
