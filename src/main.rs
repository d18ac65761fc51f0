mod cli;

use clap::Parser;
use cli::{Cli, CodesCommands, Commands, DbCommands};
use kiz_gateway::config::Config;
use kiz_gateway::{startup, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_info = Config::from_env()?;
    telemetry::init_tracing(config_info.config.log_format);
    for warning in &config_info.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(profile = config_info.profile.as_str(), "Configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => startup::serve(config_info.config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config_info.config).await,
        Commands::Config => cli::handle_config_validate(&config_info),
        Commands::Codes(CodesCommands::Retry) => cli::handle_codes_retry(&config_info.config).await,
    }
}
