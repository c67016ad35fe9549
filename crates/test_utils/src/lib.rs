//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures, and helpers for the dues ledger
//! test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data for common records
//! - `builders`: Builder patterns for dues and invoices
//! - `database`: PostgreSQL test containers
//! - `assertions`: Assertion helpers for ledger figures
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
