//! PostgreSQL setup for the loan store
//!
//! Opens the pool the loan store runs on, applies the loan schema and checks
//! that the schema is actually in place before any loan is written.

use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::Config;

/// Schema migrations for loans, installments and receipts
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Tables the loan store reads and writes
pub const LOAN_TABLES: [&str; 3] = ["loans", "scheduled_repayments", "received_repayments"];

/// Loan store setup error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Failed to connect to loan database: {0}")]
    ConnectionError(String),

    #[error("Failed to apply loan schema: {0}")]
    MigrationError(String),

    #[error("Loan schema incomplete: {0}")]
    SchemaError(String),
}

/// Open a pool sized from the configuration
pub async fn create_pool(config: &Config) -> Result<PgPool, DbError> {
    tracing::info!(
        url = %config.database_url_masked(),
        max_connections = config.db_max_connections,
        "Connecting to loan database"
    );

    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .map_err(|e| DbError::ConnectionError(e.to_string()))
}

/// Apply pending loan schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| DbError::MigrationError(e.to_string()))?;

    tracing::info!(
        migrations = MIGRATOR.iter().count(),
        "Loan schema up to date"
    );

    Ok(())
}

/// Verify every loan table exists in the connected database
pub async fn check_schema(pool: &PgPool) -> Result<(), DbError> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT table_name::TEXT FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = ANY($1)",
    )
    .bind(&LOAN_TABLES[..])
    .fetch_all(pool)
    .await
    .map_err(|e| DbError::ConnectionError(e.to_string()))?;

    let missing: Vec<&str> = LOAN_TABLES
        .iter()
        .copied()
        .filter(|table| !present.iter().any(|p| p == table))
        .collect();

    if !missing.is_empty() {
        return Err(DbError::SchemaError(format!(
            "missing tables: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}
