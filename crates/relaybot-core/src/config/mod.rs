//! Configuration module for the bot
//!
//! YAML configuration with per-section defaults, environment resolution for
//! provider credentials and validation of cross references (default provider,
//! summarizer provider).

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::BotError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<BotConfig, BotError> {
    ConfigLoader::from_file(path).await
}
