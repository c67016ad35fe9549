//! Ledger domain errors
//!
//! This module defines all error types that can occur within the dues
//! ledger domain.

use core_kernel::{MoneyError, PortError};
use thiserror::Error;

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An input value is out of range or inconsistent
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The record is in a state that does not allow the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A version-guarded write kept losing to concurrent writers
    #[error("Concurrent modification of {entity} {id} after {attempts} attempts")]
    ConcurrencyConflict {
        entity: String,
        id: String,
        attempts: u32,
    },

    /// The record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Another penalty sweep is still running
    #[error("A penalty sweep is already in progress")]
    SweepInProgress,

    /// Money arithmetic error
    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    /// Storage adapter error
    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl LedgerError {
    /// Creates an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(message.into())
    }

    /// Creates an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        LedgerError::InvalidState(message.into())
    }

    /// Creates a not found error
    pub fn not_found(entity: impl Into<String>, id: impl std::fmt::Display) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns true for errors a caller may resolve by retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::ConcurrencyConflict { .. } | LedgerError::SweepInProgress => true,
            LedgerError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<PortError> for LedgerError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound { entity_type, id } => LedgerError::NotFound {
                entity: entity_type,
                id,
            },
            PortError::Conflict { entity_type, id, .. } => LedgerError::ConcurrencyConflict {
                entity: entity_type,
                id,
                attempts: 1,
            },
            PortError::Validation { message } => LedgerError::InvalidArgument(message),
            other => LedgerError::Storage(other),
        }
    }
}
