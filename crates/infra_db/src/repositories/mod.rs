//! Repository implementations for ledger records
//!
//! Repositories own the SQL and map between rows and domain types. They
//! return [`DatabaseError`](crate::DatabaseError); the adapters in
//! [`crate::adapters`] translate that into port errors.
//!
//! Queries are built at runtime with `sqlx::query` and `QueryBuilder`, so
//! the crate compiles without a live database.

pub mod dues;
pub mod invoices;

pub use dues::DueRepository;
pub use invoices::InvoiceRepository;
