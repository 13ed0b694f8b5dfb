use clap::{Parser, Subcommand};

pub mod config;
pub mod init;
pub mod run;
pub mod status;
pub mod version;

#[derive(Parser)]
#[command(name = "lazy-consensus-bot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat bot that grants points by lazy consensus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot service
    Run {
        /// Path to config file (default: ~/.config/lazy-consensus-bot/config.toml)
        #[arg(long)]
        config: Option<String>,
    },

    /// Write a default config file
    Init {
        /// Where to write it (default: ~/.config/lazy-consensus-bot/config.toml)
        #[arg(long)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show active proposals and granted points
    Status {
        /// Path to config file (default: ~/.config/lazy-consensus-bot/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config } => run::execute(config).await,
        Commands::Init { output, force } => init::execute(output, force),
        Commands::Status { config, json } => status::execute(config, json).await,
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["lazy-consensus-bot", "run", "--config", "/etc/bot.toml"]);

        match cli.command {
            Commands::Run { config } => {
                assert_eq!(config, Some("/etc/bot.toml".to_string()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_defaults() {
        let cli = Cli::parse_from(["lazy-consensus-bot", "run"]);
        assert!(matches!(cli.command, Commands::Run { config: None }));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from([
            "lazy-consensus-bot",
            "init",
            "--output",
            "/tmp/bot.toml",
            "--force",
        ]);

        match cli.command {
            Commands::Init { output, force } => {
                assert_eq!(output, Some("/tmp/bot.toml".to_string()));
                assert!(force);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_parse_status() {
        let cli = Cli::parse_from(["lazy-consensus-bot", "status", "--json"]);

        match cli.command {
            Commands::Status { config, json } => {
                assert_eq!(config, None);
                assert!(json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_parse_version() {
        let cli = Cli::parse_from(["lazy-consensus-bot", "version"]);
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["lazy-consensus-bot", "register"]).is_err());
    }
}
