//! Configuration type definitions for the bot
//!
//! Every section is optional in YAML and falls back to the defaults below, so a
//! minimal file only needs a `providers` list (and even that defaults to a
//! single OpenAI entry reading `OPENAI_API_KEY`).

use crate::errors::BotError;
use crate::format::ResponseFormat;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot: BotSettings,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<LlmConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(default = "default_provider_name")]
    pub default_provider: String,
    #[serde(default)]
    pub default_format: ResponseFormat,
    /// Upper bound for a single provider call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Provider answering `/spec` sessions; the default provider when unset.
    #[serde(default)]
    pub agent_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default = "default_max_messages_before_summary")]
    pub max_messages_before_summary: usize,
    #[serde(default = "default_keep_last_messages")]
    pub keep_last_messages: usize,
    /// Flush the store after every ordinary turn, not only after summaries.
    #[serde(default = "default_true")]
    pub persist_every_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// Name of the provider entry used for summaries; the default provider when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Replace the provider's own parameters for summary calls only.
    #[serde(default = "default_summary_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summary_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    /// Allowed origins; any origin when unset.
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
    /// Request body limit in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub env_files: Vec<PathBuf>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name chats use to select this provider, e.g. `/provider kimi`.
    pub name: String,
    pub provider: LlmProvider,
    pub model: String,
    /// Overrides the provider's default API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub parameters: ModelParameters,
    #[serde(default)]
    pub auth: LlmAuth,
}

/// LLM provider types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Yandex,
    /// Any OpenAI-compatible chat-completions endpoint (HuggingFace router,
    /// local servers); requires `endpoint`.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmAuth {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), BotError> {
        if self.providers.is_empty() {
            return Err(BotError::ConfigError(
                "At least one provider must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(BotError::ConfigError(
                    "Provider entries require a non-empty 'name'".to_string(),
                ));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(BotError::ConfigError(format!(
                    "Duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(BotError::ConfigError(format!(
                    "Provider '{}' requires a 'model'",
                    provider.name
                )));
            }
            if provider.provider == LlmProvider::Custom
                && provider.endpoint.as_deref().map_or(true, str::is_empty)
            {
                return Err(BotError::ConfigError(format!(
                    "Custom provider '{}' requires a valid 'endpoint'",
                    provider.name
                )));
            }
        }

        if self.provider(&self.bot.default_provider).is_none() {
            return Err(BotError::ConfigError(format!(
                "Default provider '{}' is not configured",
                self.bot.default_provider
            )));
        }
        if self.provider(self.summarizer_provider()).is_none() {
            return Err(BotError::ConfigError(format!(
                "Summarizer provider '{}' is not configured",
                self.summarizer_provider()
            )));
        }
        if self.provider(self.agent_provider()).is_none() {
            return Err(BotError::ConfigError(format!(
                "Agent provider '{}' is not configured",
                self.agent_provider()
            )));
        }
        if self.summarizer.max_tokens == 0 {
            return Err(BotError::ConfigError(
                "summarizer.max_tokens must be at least 1".to_string(),
            ));
        }

        if self.memory.max_messages_before_summary == 0 {
            return Err(BotError::ConfigError(
                "memory.max_messages_before_summary must be at least 1".to_string(),
            ));
        }
        if self.memory.keep_last_messages == 0 {
            return Err(BotError::ConfigError(
                "memory.keep_last_messages must be at least 1".to_string(),
            ));
        }
        if self.bot.request_timeout_secs == 0 {
            return Err(BotError::ConfigError(
                "bot.request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<&LlmConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn summarizer_provider(&self) -> &str {
        self.summarizer
            .provider
            .as_deref()
            .unwrap_or(&self.bot.default_provider)
    }

    pub fn agent_provider(&self) -> &str {
        self.bot
            .agent_provider
            .as_deref()
            .unwrap_or(&self.bot.default_provider)
    }

    /// The summarizer provider's entry with the summary-specific parameters
    /// applied.
    pub fn summarizer_llm_config(&self) -> Option<LlmConfig> {
        let mut config = self.provider(self.summarizer_provider())?.clone();
        config.parameters.max_tokens = self.summarizer.max_tokens;
        config.parameters.temperature = self.summarizer.temperature;
        Some(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.bot.request_timeout_secs)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot: BotSettings::default(),
            memory: MemoryConfig::default(),
            summarizer: SummarizerConfig::default(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
            environment: EnvironmentConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            default_provider: default_provider_name(),
            default_format: ResponseFormat::default(),
            request_timeout_secs: default_request_timeout_secs(),
            agent_provider: None,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            max_messages_before_summary: default_max_messages_before_summary(),
            keep_last_messages: default_keep_last_messages(),
            persist_every_turn: true,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: None,
            max_tokens: default_summary_max_tokens(),
            temperature: default_summary_temperature(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            cors_origins: None,
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_providers() -> Vec<LlmConfig> {
    vec![LlmConfig {
        name: default_provider_name(),
        provider: LlmProvider::OpenAI,
        model: "gpt-4o-mini".to_string(),
        endpoint: None,
        parameters: ModelParameters::default(),
        auth: LlmAuth {
            api_key: None,
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            headers: HashMap::new(),
        },
    }]
}

fn default_provider_name() -> String { "openai".to_string() }
fn default_request_timeout_secs() -> u64 { 60 }
fn default_store_path() -> PathBuf { PathBuf::from("summaryMemory.json") }
fn default_max_messages_before_summary() -> usize { 5 }
fn default_keep_last_messages() -> usize { 2 }
fn default_true() -> bool { true }
fn default_bind_addr() -> String { "127.0.0.1:3000".to_string() }
fn default_max_body_size() -> usize { 256 * 1024 }
fn default_summary_max_tokens() -> u32 { 500 }
fn default_summary_temperature() -> f32 { 0.1 }
fn default_log_level() -> String { "info".to_string() }
fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
