use super::config::{default_config_path, BotConfig, LoggingConfig};
use lazy_consensus::bot::{BotSettings, GrantBot};
use lazy_consensus::chat::DiscordClient;
use lazy_consensus::grants::{LifecycleController, ProposalStore};
use lazy_consensus::persistence::SqliteGrantRepository;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Run the bot service
///
/// Loads the config, opens the database, connects to Discord, resumes every
/// persisted proposal and processes events until Ctrl-C. On shutdown the
/// countdowns stop; active proposals stay in the database for the next run.
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.config/lazy-consensus-bot/config.toml`
///
/// The Discord token is read from the environment variable named by
/// `discord.token_env`.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    if !config_path.exists() {
        return Err(format!(
            "Config file '{}' not found. Create one with `lazy-consensus-bot init`.",
            config_path.display()
        )
        .into());
    }

    let config = BotConfig::load(&config_path)?;
    let settings = config.grant_settings()?;
    init_logging(&config.logging)?;
    info!(config = %config_path.display(), "starting lazy consensus bot");

    let token = std::env::var(&config.discord.token_env).map_err(|_| {
        format!(
            "Environment variable {} with the bot token is not set",
            config.discord.token_env
        )
    })?;

    let repository = Arc::new(SqliteGrantRepository::open(&config.database.path).await?);
    info!(database = %config.database.path.display(), "database ready");

    let (chat, mut gateway) = DiscordClient::connect(&token, config.discord.guild_id).await?;
    let shard_manager = gateway.shard_manager.clone();
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = gateway.start().await {
            error!(error = %e, "gateway connection ended");
        }
    });

    let store = ProposalStore::new(repository.clone()).shared();
    let controller = LifecycleController::new(chat.clone(), store, repository.clone(), settings);
    controller.restore().await?;

    let bot = GrantBot::new(
        chat,
        controller.clone(),
        BotSettings {
            command_prefix: config.discord.command_prefix.clone(),
            mention_reaction: config.discord.mention_reaction.clone(),
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown_tx.send_replace(true);
            }
            Err(e) => {
                error!(error = %e, "failed to listen for Ctrl-C");
                // Keep the sender alive so the bot keeps running
                std::future::pending::<()>().await;
            }
        }
    });

    let result = bot.run(shutdown_rx).await;

    controller.shutdown();
    shard_manager.shutdown_all().await;
    if let Err(e) = gateway_task.await {
        error!(error = %e, "gateway task failed");
    }
    repository.close().await;
    info!("stopped");

    result.map_err(Into::into)
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (stderr_layer, file_layer) = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create log directory: {}", e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer()), None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}
