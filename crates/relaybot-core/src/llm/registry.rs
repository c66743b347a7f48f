//! Named provider clients.
//!
//! Chats pick a provider by name (`/provider yandex`); the registry maps those
//! names to ready clients, each wrapped in a `TimeoutLLM`. A provider whose
//! credentials are missing is skipped with a warning unless it is the default,
//! the summarizer or the agent provider, in which case building the registry
//! fails.

use crate::config::BotConfig;
use crate::errors::BotError;
use crate::llm::providers::create_llm_client;
use crate::llm::{TimeoutLLM, LLM};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn LLM>>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Result<Self, BotError> {
        let timeout = config.request_timeout();
        let mut registry = Self::new(config.bot.default_provider.clone());

        for provider in &config.providers {
            match create_llm_client(provider) {
                Ok(client) => {
                    log::info!(
                        "Registered provider '{}' ({:?}, model {})",
                        provider.name,
                        provider.provider,
                        provider.model
                    );
                    registry.register(
                        provider.name.clone(),
                        Arc::new(TimeoutLLM::new(client, timeout)),
                    );
                }
                Err(e) => {
                    let required = provider.name == config.bot.default_provider
                        || provider.name == config.summarizer_provider()
                        || provider.name == config.agent_provider();
                    if required {
                        return Err(e);
                    }
                    log::warn!("Skipping provider '{}': {}", provider.name, e);
                }
            }
        }

        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, llm: Arc<dyn LLM>) {
        self.providers.insert(name.into(), llm);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn LLM>, BotError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| BotError::ProviderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Provider names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
