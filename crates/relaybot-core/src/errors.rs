//! Error types shared by the memory, provider and dispatch layers
//!
//! Failures are grouped by where they come from (provider transport, response
//! parsing, configuration, disk) so callers can decide whether to surface a
//! user-facing fallback or just log and carry on. Persistence errors in
//! particular are almost always swallowed after logging: the bot keeps running
//! with whatever it has in memory.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BotError {
    #[error("LLM interaction failed: {0}")]
    LLMError(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unknown provider: {0}")]
    ProviderNotFound(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl BotError {
    /// Whether the error came from talking to a completion provider.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BotError::LLMError(_) | BotError::ParsingError(_) | BotError::Timeout(_)
        )
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::IoError(err.to_string())
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::LLMError(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::ParsingError(err.to_string())
    }
}

impl From<serde_yaml::Error> for BotError {
    fn from(err: serde_yaml::Error) -> Self {
        BotError::ConfigError(err.to_string())
    }
}
