//! Configuration management for the loan engine
//!
//! This module handles loading and validating configuration from environment variables,
//! with support for different environments (development, staging, production).

use std::env;
use thiserror::Error;

use crate::loan::{AllocationPolicy, OverpaymentPolicy, ReceiptAccounting};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),
}

/// Application environment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Parse environment from string
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get the environment name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

fn parse_receipt_accounting(s: &str) -> Result<ReceiptAccounting, ConfigError> {
    match s.to_lowercase().as_str() {
        "settled" => Ok(ReceiptAccounting::Settled),
        "due_only" | "due-only" => Ok(ReceiptAccounting::DueOnly),
        _ => Err(ConfigError::InvalidValue(format!(
            "Invalid RECEIPT_ACCOUNTING: '{}'. Expected: settled or due_only",
            s
        ))),
    }
}

fn parse_overpayment_policy(s: &str) -> Result<OverpaymentPolicy, ConfigError> {
    match s.to_lowercase().as_str() {
        "absorb" => Ok(OverpaymentPolicy::Absorb),
        "reject" => Ok(OverpaymentPolicy::Reject),
        _ => Err(ConfigError::InvalidValue(format!(
            "Invalid OVERPAYMENT_POLICY: '{}'. Expected: absorb or reject",
            s
        ))),
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Current environment
    pub environment: Environment,

    /// Maximum database connections
    pub db_max_connections: u32,

    /// Log level (RUST_LOG)
    pub log_level: String,

    /// Which settled amounts count toward receipts
    pub receipt_accounting: ReceiptAccounting,

    /// What to do with payments above the outstanding balance
    pub overpayment_policy: OverpaymentPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .map(|s| Environment::from_str(&s))
            .unwrap_or(Ok(Environment::Development))?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse::<u32>()
            .unwrap_or(5);

        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let receipt_accounting = lookup("RECEIPT_ACCOUNTING")
            .map(|s| parse_receipt_accounting(&s))
            .unwrap_or(Ok(ReceiptAccounting::default()))?;

        let overpayment_policy = lookup("OVERPAYMENT_POLICY")
            .map(|s| parse_overpayment_policy(&s))
            .unwrap_or(Ok(OverpaymentPolicy::default()))?;

        Ok(Config {
            database_url,
            environment,
            db_max_connections,
            log_level,
            receipt_accounting,
            overpayment_policy,
        })
    }

    /// Allocation policy the loan service should run with
    pub fn allocation_policy(&self) -> AllocationPolicy {
        AllocationPolicy {
            receipt_accounting: self.receipt_accounting,
            overpayment: self.overpayment_policy,
        }
    }

    /// Get database URL (useful for logging masked version)
    pub fn database_url_masked(&self) -> String {
        // Mask password in database URL for logging
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}
