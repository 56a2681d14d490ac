pub mod config;
pub mod publish;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AuditLogConfig;
use crate::error::Result;

/// A3S Audit Log - audit event ingestion and query service
#[derive(Debug, Parser)]
#[command(name = "a3s-audit-log", version, about)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Consume configured subscriptions and serve the query API
    Serve {
        /// Host address to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Publish one event to a topic
    Publish {
        /// Topic to publish to
        #[arg(long, default_value = "topic-audit")]
        topic: String,

        /// Event as JSON
        payload: String,

        /// Send the payload as-is without validating it
        #[arg(long)]
        raw: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

/// Config file (or defaults) overlaid with the environment
pub fn load_config(path: Option<&std::path::Path>) -> Result<AuditLogConfig> {
    let mut config = AuditLogConfig::load(path)?;
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_globals() {
        let cli = Cli::parse_from([
            "a3s-audit-log",
            "serve",
            "--port",
            "9000",
            "--config",
            "audit.toml",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("audit.toml")));
        assert!(matches!(
            cli.command,
            Commands::Serve {
                host: None,
                port: Some(9000)
            }
        ));
    }

    #[test]
    fn test_parse_publish() {
        let cli = Cli::parse_from(["a3s-audit-log", "publish", "{\"user_id\":\"u1\"}"]);
        match cli.command {
            Commands::Publish {
                topic,
                payload,
                raw,
            } => {
                assert_eq!(topic, "topic-audit");
                assert_eq!(payload, "{\"user_id\":\"u1\"}");
                assert!(!raw);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_default() {
        let cli = Cli::parse_from(["a3s-audit-log", "config", "--default"]);
        assert!(matches!(cli.command, Commands::Config { default: true }));
    }
}
