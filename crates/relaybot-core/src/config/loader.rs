//! Configuration loader for YAML files and environment resolution
//!
//! Loading is read → parse → resolve environment → validate. Secrets never
//! need to live in the YAML file: `api_key_env` names the variable to read, and
//! `${VAR}` references inside model identifiers and URLs (Yandex model URIs
//! carry the cloud folder id, for instance) are expanded from the environment.

use crate::config::types::*;
use crate::errors::BotError;
use regex::Regex;
use std::env;
use std::path::Path;
use std::sync::OnceLock;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<BotConfig, BotError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            BotError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content, path.parent())
    }

    /// Load configuration from a YAML string. Relative `env_files` and
    /// `store_path` entries are resolved against `base_dir` when given.
    pub fn from_str(content: &str, base_dir: Option<&Path>) -> Result<BotConfig, BotError> {
        let mut config: BotConfig = serde_yaml::from_str(content)
            .map_err(|e| BotError::ConfigError(format!("Failed to parse YAML config: {}", e)))?;

        if let Some(base_dir) = base_dir {
            Self::resolve_paths(&mut config, base_dir);
        }

        Self::resolve_environment(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    fn resolve_paths(config: &mut BotConfig, base_dir: &Path) {
        for env_file in &mut config.environment.env_files {
            if env_file.is_relative() {
                *env_file = base_dir.join(&*env_file);
            }
        }
        if config.memory.store_path.is_relative() {
            config.memory.store_path = base_dir.join(&config.memory.store_path);
        }
    }

    /// Resolve environment variables in the configuration
    fn resolve_environment(config: &mut BotConfig) -> Result<(), BotError> {
        for env_file in &config.environment.env_files {
            if env_file.exists() {
                log::info!("Loading environment file: {}", env_file.display());
                Self::load_env_file(env_file)?;
            } else {
                log::debug!("Environment file {} not found, skipping", env_file.display());
            }
        }

        for (key, value) in &config.environment.variables {
            env::set_var(key, value);
        }

        for provider in &mut config.providers {
            provider.model = expand_env_refs(&provider.model)?;
            if let Some(endpoint) = &provider.endpoint {
                provider.endpoint = Some(expand_env_refs(endpoint)?);
            }
            Self::resolve_llm_auth(&provider.name, &mut provider.auth);
        }

        Ok(())
    }

    /// Variables already present in the process environment win over the file.
    fn load_env_file(path: &Path) -> Result<(), BotError> {
        dotenvy::from_path(path).map_err(|e| {
            BotError::ConfigError(format!(
                "Failed to load env file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Resolve provider authentication from environment
    fn resolve_llm_auth(provider_name: &str, auth: &mut LlmAuth) {
        if let Some(env_var) = &auth.api_key_env {
            match env::var(env_var) {
                Ok(api_key) => auth.api_key = Some(api_key),
                Err(_) => log::warn!(
                    "Provider '{}': environment variable {} is not set",
                    provider_name,
                    env_var
                ),
            }
        }
    }
}

fn env_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Expand `${VAR}` references; an unset variable is a configuration error.
pub fn expand_env_refs(value: &str) -> Result<String, BotError> {
    let pattern = env_ref_pattern();
    let mut missing = None;
    let expanded = pattern.replace_all(value, |caps: &regex::Captures| {
        let name = &caps[1];
        env::var(name).unwrap_or_else(|_| {
            missing.get_or_insert_with(|| name.to_string());
            String::new()
        })
    });

    match missing {
        Some(name) => Err(BotError::ConfigError(format!(
            "Environment variable {} referenced in '{}' is not set",
            name, value
        ))),
        None => Ok(expanded.into_owned()),
    }
}
