//! Ports and Adapters Infrastructure
//!
//! Storage for ledger records sits behind port traits defined in the domain
//! crate. This module holds the pieces every port shares: the error type
//! adapters must return and the marker trait port traits extend.
//!
//! ```text
//!   domain services ──► port traits (domain_ledger::ports)
//!                              ▲                 ▲
//!                     in-memory adapter   PostgreSQL adapter
//!                          (infra_db)         (infra_db)
//! ```

use std::fmt;
use thiserror::Error;

/// Error type for port operations
///
/// Provides a unified error type that all port implementations must use,
/// ensuring consistent error handling across adapters.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// A validation error occurred
    #[error("Validation error: {message}")]
    Validation {
        message: String,
    },

    /// Optimistic-lock check failed: the stored version moved on
    #[error("Conflict on {entity_type} {id}: expected version {expected}, found {actual}")]
    Conflict {
        entity_type: String,
        id: String,
        expected: u64,
        actual: u64,
    },

    /// A record with the same key already exists
    #[error("Duplicate: {message}")]
    Duplicate {
        message: String,
    },

    /// Connection to the underlying store failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
        }
    }

    /// Creates a Conflict error for a failed version check
    pub fn conflict(
        entity_type: impl Into<String>,
        id: impl fmt::Display,
        expected: u64,
        actual: u64,
    ) -> Self {
        PortError::Conflict {
            entity_type: entity_type.into(),
            id: id.to_string(),
            expected,
            actual,
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Conflict { .. })
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    /// Returns true if this error is a lost-update conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}
