//! Worker error handling

use domain_ledger::LedgerError;
use infra_db::DatabaseError;
use thiserror::Error;

/// Errors raised while configuring or running the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl WorkerError {
    pub fn config(message: impl Into<String>) -> Self {
        WorkerError::Config(message.into())
    }
}
