//! Interactive setup wizard for conduit.

pub mod validation;

use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};

use crate::error::Result;
use validation::{display_error, display_info, display_success};

/// Configuration collected from the setup wizard.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    pub database_url: String,
    pub llm_secret: String,
    pub run_migrations: bool,
}

/// Run the interactive setup wizard
pub async fn run_init() -> Result<SetupConfig> {
    println!();
    println!("{}", style("conduit setup").bold().cyan());
    println!();

    let database_url = setup_database().await?;

    let run_migrations = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Run migrations now?")
        .default(true)
        .interact()
        .unwrap_or(true);

    let llm_secret = setup_llm_secret()?;

    Ok(SetupConfig {
        database_url,
        llm_secret,
        run_migrations,
    })
}

/// Database setup step
async fn setup_database() -> Result<String> {
    println!("{}", style("Database").bold());

    let database_url: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("SQLite database URL")
        .default("sqlite://conduit.db".to_string())
        .interact_text()
        .map_err(|e| crate::error::Error::Other(format!("Input error: {}", e)))?;

    display_info("Testing connection...");
    match validation::test_database_connection(&database_url).await {
        Ok(_) => {
            display_success("Connected!");
        }
        Err(e) => {
            display_error(&format!("Connection failed: {}", e));
            return Err(e);
        }
    }

    println!();
    Ok(database_url)
}

/// LLM provider secret setup step
fn setup_llm_secret() -> Result<String> {
    println!("{}", style("LLM provider").bold());

    let secret: String = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("LLM provider secret (tollbooth internal secret)")
        .allow_empty_password(true)
        .interact()
        .map_err(|e| crate::error::Error::Other(format!("Input error: {}", e)))?;

    if secret.is_empty() {
        display_error("No secret set — tool loops will fail to reach the LLM until CONDUIT_LLM_SECRET is set");
    } else {
        display_success("Secret recorded");
    }

    println!();
    Ok(secret)
}

/// Save configuration to .env file
pub fn save_config(config: &SetupConfig) -> Result<()> {
    if std::path::Path::new(".env").exists() {
        println!();
        println!(
            "{} {}",
            style("!").yellow().bold(),
            style(".env already exists in this directory").yellow().bold()
        );

        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Overwrite existing .env file?")
            .default(false)
            .interact()
            .unwrap_or(false);

        if !overwrite {
            println!();
            println!(
                "{} Configuration cancelled. Your existing .env was not modified.",
                style("✓").green().bold()
            );
            println!();
            return Ok(());
        }
    }

    let mut content = String::new();
    content.push_str("# Generated by conduit init\n\n");
    content.push_str("# Database (required)\n");
    content.push_str(&format!("DATABASE_URL={}\n\n", config.database_url));
    content.push_str("# LLM provider\n");
    content.push_str(&format!("CONDUIT_LLM_SECRET={}\n", config.llm_secret));

    std::fs::write(".env", content)
        .map_err(|e| crate::error::Error::Other(format!("Failed to write .env: {}", e)))?;

    display_success("Configuration saved to .env");
    Ok(())
}

/// Display completion message with next steps
pub fn display_completion() {
    println!();
    println!("{}", style("Done! Try these commands:").bold().green());
    println!("  {} - Run pending migrations", style("conduit migrate").cyan());
    println!("  {} - Start the server", style("conduit serve").cyan());
    println!("  {} - Issue a device invite token", style("conduit admin create-token").cyan());
    println!();
}
