//! Validation utilities for the setup wizard.

use console::style;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{Error, Result};

/// Test that a SQLite database URL is reachable (and creatable).
pub async fn test_database_connection(database_url: &str) -> Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await
        .map_err(|e| Error::Database(format!("connection failed: {e}")))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| Error::Database(format!("query test failed: {e}")))?;

    pool.close().await;
    Ok(())
}

/// Display an error message with formatting
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), style(message).red());
}

/// Display a success message with formatting
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

/// Display an info message with formatting
pub fn display_info(message: &str) {
    println!("{} {}", style("⏳").yellow().bold(), message);
}
