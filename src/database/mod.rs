//! SQLite-backed database handle: pool construction, migrations, health
//! check. Adapted from the reference crate's Postgres `Database` (see
//! `DESIGN.md`'s Postgres→SQLite decision) — the pool options and
//! `after_connect` hook are SQLite's, everything else keeps the same shape.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool. `database_url` may be a file
    /// path (`sqlite://conduit.db`) or `sqlite::memory:` for tests.
    pub async fn new(database_url: &str) -> Result<Self> {
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        tracing::info!("Database pool max connections: {}", max_connections);

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| Error::Database(format!("invalid database url {database_url:?}: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }

    /// Create from an existing pool (used by tests to share an in-memory
    /// database across connections).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Test connectivity and run pending migrations.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to connect: {e}")))?;

        self.run_migrations().await?;

        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("failed to run migrations: {e}")))?;

        Ok(())
    }

    pub async fn health_check(&self) -> Result<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                is_healthy: true,
                message: "connected".to_string(),
            }),
            Err(e) => Ok(HealthStatus {
                is_healthy: false,
                message: format!("connection failed: {e}"),
            }),
        }
    }
}

#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_creation() {
        let result = Database::new("sqlite::memory:").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_reports_healthy() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let status = db.health_check().await.unwrap();
        assert!(status.is_healthy);
    }
}
