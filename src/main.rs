use clap::Parser;
use tracing_subscriber::EnvFilter;

use a3s_audit_log::cli::{self, Cli, Commands};
use a3s_audit_log::AuditLogConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "a3s_audit_log=debug,tower_http=debug"
    } else {
        "a3s_audit_log=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::serve::execute(config, host, port).await?;
        }
        Commands::Publish {
            topic,
            payload,
            raw,
        } => {
            let config = cli::load_config(cli.config.as_deref())?;
            cli::publish::execute(&config, &topic, &payload, raw).await?;
        }
        Commands::Config { default } => {
            let config = if default {
                AuditLogConfig::default()
            } else {
                cli::load_config(cli.config.as_deref())?
            };
            cli::config::execute(&config)?;
        }
    }

    Ok(())
}
