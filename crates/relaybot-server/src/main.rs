//! relaybot server binary
//!
//! Loads the YAML configuration, restores conversation memory from disk,
//! builds the provider registry and serves the HTTP relay until Ctrl+C or
//! SIGTERM, then flushes memory one last time.

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use relaybot_core::config::ConfigLoader;
use relaybot_core::llm::{ProviderRegistry, Summarizer};
use relaybot_core::memory::{ConversationMemoryManager, LoadOutcome, MemoryStore};
use relaybot_core::Dispatcher;
use relaybot_server::{shutdown_signal, RelayServer, ServerConfig};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "relaybot server - chat relay with summarized conversation memory")]
struct Cli {
    #[clap(long, short, default_value = "relaybot.yaml", help = "Path to the YAML configuration file")]
    config: String,

    #[clap(long, help = "Overrides server.bind_addr from the configuration")]
    bind_addr: Option<String>,

    #[clap(long, short, help = "Overrides logging.level from the configuration")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // the configured level is only known after loading, so filter through the
    // global max level instead of the logger's own filter
    env_logger::Builder::new()
        .filter_level(LevelFilter::Trace)
        .init();
    log::set_max_level(parse_level(cli.log_level.as_deref().unwrap_or("info")));

    log::info!("Loading configuration from: {}", cli.config);
    let config = ConfigLoader::from_file(&cli.config).await?;
    if cli.log_level.is_none() {
        log::set_max_level(parse_level(&config.logging.level));
    }

    let store = Arc::new(MemoryStore::new(&config.memory.store_path));
    match store.load().await {
        LoadOutcome::Loaded(count) => log::info!("Restored {} conversations", count),
        LoadOutcome::Created => log::info!("Starting with an empty memory file"),
        LoadOutcome::RecoveredFromCorruption => {
            log::warn!("Memory file was corrupt; previous conversations are lost")
        }
        LoadOutcome::Unreadable => {
            log::error!("Memory file is unreadable; running with in-memory state only")
        }
    }

    let registry = ProviderRegistry::from_config(&config)?;
    log::info!(
        "Providers: {} (default: {})",
        registry.names().join(", "),
        registry.default_provider()
    );

    let summarizer = Summarizer::from_config(&config)?;
    let memory = Arc::new(ConversationMemoryManager::from_config(
        &config.memory,
        store.clone(),
        summarizer,
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(memory, registry, config.bot.default_format)
            .with_agent_provider(config.agent_provider()),
    );

    let bind_addr = cli
        .bind_addr
        .clone()
        .unwrap_or_else(|| config.server.bind_addr.clone());
    let mut server_config = ServerConfig::default()
        .with_bind_addr_str(&bind_addr)?
        .with_cors(config.server.enable_cors)
        .with_max_body_size(config.server.max_body_size)
        .with_logging(true);
    if let Some(origins) = config.server.cors_origins.clone() {
        server_config = server_config.with_cors_origins(origins);
    }

    let server = RelayServer::with_config(dispatcher, server_config);
    let result = server.serve_with_shutdown(shutdown_signal()).await;

    if !store.shutdown().await {
        log::error!("Final memory flush failed; recent turns may be lost");
    }

    if let Err(e) = result {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    log::info!("relaybot server shut down gracefully.");
    Ok(())
}

fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", level);
        LevelFilter::Info
    })
}
