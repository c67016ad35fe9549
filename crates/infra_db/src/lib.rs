//! Infrastructure Database Layer
//!
//! Storage for the dues ledger. Two implementations of the ledger ports
//! live here:
//!
//! - [`PostgresLedgerAdapter`]: PostgreSQL through SQLx, with versioned
//!   updates and transactional payment and penalty commits
//! - [`InMemoryLedgerStore`]: maps behind a lock, for tests and embedding
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerAdapter};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/dues_ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerAdapter::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod memory;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, create_pool_from_url, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use memory::InMemoryLedgerStore;
pub use adapters::PostgresLedgerAdapter;
pub use repositories::{DueRepository, InvoiceRepository};
