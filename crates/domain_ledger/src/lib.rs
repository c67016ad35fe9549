//! Dues Ledger Domain
//!
//! This crate tracks what a student-loan customer owes, what they have paid
//! and how overdue balances accrue penalties over time.
//!
//! # Flow
//!
//! - [`enrollment`] splits a program fee into scholarship and net payable
//! - dues ([`due::DueLedgerEntry`]) are created by an external schedule and
//!   carry the figures derived from the enrollment
//! - [`payment::PaymentApplier`] applies payments to dues and issues receipts
//! - [`penalty::LatePenaltyEngine`] sweeps overdue dues and accrues penalties
//! - [`invoice`] aggregates dues and ad-hoc line items into billable documents
//! - [`reporting::LedgerReports`] answers balance and arrears questions
//!
//! Persistence sits behind the port traits in [`ports`].
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{PaymentApplier, PaymentRequest, PaymentMethod};
//!
//! let applier = PaymentApplier::new(store.clone(), clock.clone());
//! let receipt = applier
//!     .apply_payment(due_id, PaymentRequest::new(amount, today, PaymentMethod::Cash))
//!     .await?;
//! println!("receipt {}", receipt.receipt_number);
//! ```

pub mod error;
pub mod enrollment;
pub mod due;
pub mod numbering;
pub mod payment;
pub mod penalty;
pub mod invoice;
pub mod ports;
pub mod reporting;

pub use error::LedgerError;
pub use enrollment::{compute_fee, Enrollment, EnrollmentStatus, FeeBreakdown};
pub use due::{DueLedgerEntry, DueStatus, NewDue};
pub use numbering::NumberGenerator;
pub use payment::{PaymentApplier, PaymentHistory, PaymentMethod, PaymentRequest, PaymentStatus};
pub use penalty::{
    assess_penalty, LatePaymentPenalty, LatePenaltyEngine, PenaltyAssessment, PenaltyPolicy,
    SweepSummary,
};
pub use invoice::{Invoice, InvoiceAggregator, InvoiceLineItem, InvoiceStatus};
pub use ports::{DueLedgerPort, DueQuery, InvoicePort};
pub use reporting::LedgerReports;
