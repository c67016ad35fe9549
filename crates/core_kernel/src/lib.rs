//! Core Kernel - Foundational types for the dues ledger
//!
//! This crate provides the building blocks shared by the ledger domain and
//! its adapters:
//! - Money types with precise decimal arithmetic and half-up rounding
//! - Business dates, timezones and injectable clocks
//! - Strongly typed identifiers
//! - Audit metadata with a soft-delete lifecycle
//! - The error type shared by all storage ports

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod audit;
pub mod ports;
pub mod error;

pub use money::{Money, Currency, MoneyError, Rate, ExchangeRate, round_half_up};
pub use temporal::{Clock, SystemClock, FixedClock, DateRange, Timezone, TemporalError, days_between};
pub use identifiers::{
    CustomerId, ProgramId, EnrollmentId, DueId, PaymentId, PenaltyId, InvoiceId, LineItemId,
};
pub use audit::{AuditMetadata, Lifecycle};
pub use ports::{PortError, DomainPort};
pub use error::CoreError;
