//! Bot configuration file handling
//!
//! Provides default configuration generation and loading. Configuration files
//! are TOML. The Discord token is never stored in the file; the file names the
//! environment variable that holds it.
//!
//! Durations (`timer`, `poll_interval`) use humantime syntax: "3days", "1m",
//! "90s".

use lazy_consensus::chat::{ChannelId, RoleId};
use lazy_consensus::grants::GrantSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_THRESHOLD: usize = 8;
const DEFAULT_TIMER: &str = "3days";
const DEFAULT_POLL_INTERVAL: &str = "1m";
const DEFAULT_CANCEL_EMOJI: &str = "❌";
const DEFAULT_MENTION_REACTION: &str = "👋";
const DEFAULT_DATABASE: &str = "lazy-consensus-bot.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub discord: DiscordConfig,

    #[serde(default)]
    pub voting: VotingConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Environment variable holding the bot token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Server the bot serves
    pub guild_id: u64,

    #[serde(default = "default_prefix")]
    pub command_prefix: String,

    /// Pinged in error messages, e.g. "<@123>" or "<@&456>" for a role
    #[serde(default)]
    pub responsible_mention: String,

    #[serde(default = "default_mention_reaction")]
    pub mention_reaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingConfig {
    /// Channel where voting messages are posted
    #[serde(default)]
    pub channel_id: u64,

    /// Opposing votes needed to cancel a proposal
    #[serde(default = "default_threshold")]
    pub threshold: usize,

    /// Countdown per proposal
    #[serde(default = "default_timer")]
    pub timer: String,

    /// How often a countdown wakes
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Roles whose members may vote
    #[serde(default)]
    pub allowed_role_ids: Vec<u64>,

    #[serde(default = "default_cancel_emoji")]
    pub cancel_emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, created on first run
    #[serde(default = "default_database")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_mention_reaction() -> String {
    DEFAULT_MENTION_REACTION.to_string()
}

fn default_threshold() -> usize {
    DEFAULT_THRESHOLD
}

fn default_timer() -> String {
    DEFAULT_TIMER.to_string()
}

fn default_poll_interval() -> String {
    DEFAULT_POLL_INTERVAL.to_string()
}

fn default_cancel_emoji() -> String {
    DEFAULT_CANCEL_EMOJI.to_string()
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            threshold: DEFAULT_THRESHOLD,
            timer: default_timer(),
            poll_interval: default_poll_interval(),
            allowed_role_ids: Vec::new(),
            cancel_emoji: default_cancel_emoji(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: BotConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Validate the voting section and convert it to core settings
    pub fn grant_settings(&self) -> Result<GrantSettings, Box<dyn std::error::Error>> {
        let voting = &self.voting;

        if voting.threshold == 0 {
            return Err("voting.threshold must be at least 1".into());
        }
        if voting.channel_id == 0 {
            return Err("voting.channel_id must be set".into());
        }

        let timer = parse_duration("voting.timer", &voting.timer)?;
        let poll_interval = parse_duration("voting.poll_interval", &voting.poll_interval)?;
        if poll_interval > timer {
            return Err(format!(
                "voting.poll_interval ({}) must not exceed voting.timer ({})",
                voting.poll_interval, voting.timer
            )
            .into());
        }

        Ok(GrantSettings {
            threshold: voting.threshold,
            timer,
            poll_interval,
            voting_channel: ChannelId(voting.channel_id),
            allowed_roles: voting.allowed_role_ids.iter().copied().map(RoleId).collect(),
            cancel_emoji: voting.cancel_emoji.clone(),
            responsible_mention: self.discord.responsible_mention.clone(),
        })
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Lazy Consensus Bot Configuration
#
# A proposal grants points unless `threshold` members with one of
# `allowed_role_ids` react with `cancel_emoji` before `timer` runs out.

[discord]
# Environment variable holding the bot token (the token itself never goes here)
token_env = "DISCORD_TOKEN"

# Server (guild) id
guild_id = 0

# Commands look like `!propose @user 100 for writing docs`
command_prefix = "!"

# Who gets pinged when something goes wrong, e.g. "<@123456789>"
responsible_mention = ""

# Reaction added to messages that mention the bot
mention_reaction = "{mention_reaction}"

[voting]
# Channel where voting messages are posted
channel_id = 0

# Opposing votes needed to cancel a proposal
threshold = {threshold}

# Countdown per proposal and how often it is checked (humantime: "3days", "1m")
timer = "{timer}"
poll_interval = "{poll_interval}"

# Roles whose members may vote against proposals
allowed_role_ids = []

cancel_emoji = "{cancel_emoji}"

[database]
# SQLite file holding active proposals, votes and granted points
path = "{database}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "logs/lazy-consensus-bot.log"
"#,
            mention_reaction = DEFAULT_MENTION_REACTION,
            threshold = DEFAULT_THRESHOLD,
            timer = DEFAULT_TIMER,
            poll_interval = DEFAULT_POLL_INTERVAL,
            cancel_emoji = DEFAULT_CANCEL_EMOJI,
            database = DEFAULT_DATABASE,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let duration = humantime::parse_duration(value)
        .map_err(|e| format!("Invalid {} '{}': {}", field, value, e))?;
    if duration.is_zero() {
        return Err(format!("{} must be greater than zero", field).into());
    }
    Ok(duration)
}

/// Get the default config file path
///
/// - Linux: ~/.config/lazy-consensus-bot/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lazy-consensus-bot")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config() -> BotConfig {
        let mut config: BotConfig = toml::from_str(&BotConfig::generate_default_toml()).unwrap();
        config.discord.guild_id = 1;
        config.voting.channel_id = 200;
        config.voting.allowed_role_ids = vec![7];
        config
    }

    #[test]
    fn test_generate_default_toml_parses() {
        let config: BotConfig = toml::from_str(&BotConfig::generate_default_toml()).unwrap();

        assert_eq!(config.discord.token_env, "DISCORD_TOKEN");
        assert_eq!(config.discord.command_prefix, "!");
        assert_eq!(config.voting.threshold, 8);
        assert_eq!(config.voting.timer, "3days");
        assert_eq!(config.database.path, PathBuf::from("lazy-consensus-bot.db"));
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[discord]\nguild_id = 42\n").unwrap();

        let config = BotConfig::load(&config_path).unwrap();

        assert_eq!(config.discord.guild_id, 42);
        assert_eq!(config.discord.mention_reaction, "👋");
        assert_eq!(config.voting.cancel_emoji, "❌");
        assert_eq!(config.voting.poll_interval, "1m");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = valid_config();
        config.save(&config_path).unwrap();

        let loaded = BotConfig::load(&config_path).unwrap();
        assert_eq!(loaded.voting.channel_id, 200);
        assert_eq!(loaded.voting.allowed_role_ids, vec![7]);
    }

    #[test]
    fn test_create_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        BotConfig::create_default(&config_path).unwrap();

        assert!(config_path.exists());
        assert!(BotConfig::load(&config_path).is_ok());
    }

    #[test]
    fn test_grant_settings() {
        let settings = valid_config().grant_settings().unwrap();

        assert_eq!(settings.threshold, 8);
        assert_eq!(settings.timer, Duration::from_secs(3 * 24 * 60 * 60));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
        assert_eq!(settings.voting_channel, ChannelId(200));
        assert_eq!(settings.allowed_roles, vec![RoleId(7)]);
    }

    #[test]
    fn test_grant_settings_rejects_bad_values() {
        let mut zero_threshold = valid_config();
        zero_threshold.voting.threshold = 0;
        assert!(zero_threshold.grant_settings().is_err());

        let mut no_channel = valid_config();
        no_channel.voting.channel_id = 0;
        assert!(no_channel.grant_settings().is_err());

        let mut garbage_timer = valid_config();
        garbage_timer.voting.timer = "soon".to_string();
        assert!(garbage_timer.grant_settings().is_err());

        let mut zero_poll = valid_config();
        zero_poll.voting.poll_interval = "0s".to_string();
        assert!(zero_poll.grant_settings().is_err());

        let mut slow_poll = valid_config();
        slow_poll.voting.timer = "10s".to_string();
        slow_poll.voting.poll_interval = "1m".to_string();
        assert!(slow_poll.grant_settings().is_err());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("lazy-consensus-bot/config.toml"));
    }
}
