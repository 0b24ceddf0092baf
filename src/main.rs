//! conduit CLI - command-line interface for the conduit agent bridge

use clap::Parser;
use conduit::cli::types::{Cli, Commands};
use conduit::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    // Init doesn't need a loaded Config: it's the thing that produces one.
    if matches!(cli.command, Commands::Init) {
        let setup_config = conduit::setup::run_init().await?;
        conduit::setup::save_config(&setup_config)?;

        if setup_config.run_migrations {
            println!();
            println!("Running migrations...");
            let db = conduit::database::Database::new(&setup_config.database_url).await?;
            db.initialize().await?;
            println!("Migrations complete");
        }

        conduit::setup::display_completion();
        return Ok(());
    }

    let config = Config::from_env()?;
    conduit::cli::run(cli, config).await?;

    Ok(())
}
