//! Port adapters backed by PostgreSQL
//!
//! Adapters implement the domain ports on top of the repositories and
//! translate [`DatabaseError`](crate::DatabaseError) into `PortError`.

pub mod ledger;

pub use ledger::PostgresLedgerAdapter;
