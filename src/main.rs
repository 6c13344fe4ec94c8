//! Loan engine maintenance binary
//!
//! Loads configuration, prepares the database schema and verifies the loan
//! store is reachable. The engine itself is driven by the application that
//! embeds the library.

use std::sync::Arc;

use anyhow::Context;
use loan_engine::config::Config;
use loan_engine::store::PgLoanStore;
use loan_engine::LoanService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting loan engine"
    );

    let store = PgLoanStore::connect(&config)
        .await
        .context("Failed to prepare loan store")?;

    let service = LoanService::new(Arc::new(store), config.allocation_policy());

    tracing::info!(
        receipt_accounting = ?service.policy().receipt_accounting,
        overpayment = ?service.policy().overpayment,
        "Loan store ready"
    );

    Ok(())
}
