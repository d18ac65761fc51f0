use clap::{Parser, Subcommand};
use kiz_gateway::config::{Config, ConfigInfo};
use kiz_gateway::{db, startup};

#[derive(Parser)]
#[command(name = "kiz-gateway")]
#[command(about = "KIZ Gateway - marking code orders and Robokassa payments", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Validate and print the effective configuration
    Config,

    /// Marking code request commands
    #[command(subcommand)]
    Codes(CodesCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum CodesCommands {
    /// Run one retry batch over due pending code requests
    Retry,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(info: &ConfigInfo) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration (profile: {}):", info.profile.as_str());
    for (key, value) in info.config.masked_summary() {
        let marker = if info.overrides.iter().any(|o| o == key) {
            ""
        } else {
            " (default)"
        };
        println!("  {}: {}{}", key, value, marker);
    }

    for warning in &info.warnings {
        println!("⚠️  {}", warning);
    }

    println!("✓ Configuration is valid");
    Ok(())
}

pub async fn handle_codes_retry(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    let deps = startup::build_dependencies(config, pool)?;
    let job = startup::code_retry_job(config, &deps);

    let summary = job.run_batch().await?;
    println!(
        "Claimed {} | completed {} | pending {} | failed {} | errors {}",
        summary.claimed, summary.completed, summary.pending, summary.failed, summary.errors
    );
    Ok(())
}
