//! Completion provider implementations
//!
//! Each provider implements the common `LLM` trait while handling its own
//! wire protocol and authentication.

use crate::config::{LlmConfig, LlmProvider};
use crate::errors::BotError;
use crate::llm::LLM;
use std::sync::Arc;

pub mod openai;
pub mod yandex;

/// Create an LLM client based on the provider configuration
pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LLM>, BotError> {
    match config.provider {
        LlmProvider::OpenAI => openai::create_client(config),
        LlmProvider::Yandex => yandex::create_client(config),
        LlmProvider::Custom => {
            let base_url = config.endpoint.as_deref().ok_or_else(|| {
                BotError::ConfigError(format!(
                    "Custom provider '{}' requires an 'endpoint'",
                    config.name
                ))
            })?;
            openai::create_custom_client(config, base_url)
        }
    }
}
