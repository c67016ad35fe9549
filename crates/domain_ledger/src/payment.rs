//! Payment application
//!
//! Payments arrive already authorized by a cashier or gateway; the ledger
//! records them against a due and issues a receipt. A [`PaymentHistory`]
//! record is immutable: corrections are new records, never edits.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::{Clock, Currency, CustomerId, DueId, EnrollmentId, Money, PaymentId};

use crate::due::DueLedgerEntry;
use crate::error::LedgerError;
use crate::numbering::NumberGenerator;
use crate::ports::DueLedgerPort;

/// Attempts made before a contended payment gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Cheque,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::Cheque => "CHEQUE",
            PaymentMethod::Online => "ONLINE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CASH" => Some(PaymentMethod::Cash),
            "CARD" => Some(PaymentMethod::Card),
            "BANK_TRANSFER" => Some(PaymentMethod::BankTransfer),
            "CHEQUE" => Some(PaymentMethod::Cheque),
            "ONLINE" => Some(PaymentMethod::Online),
            _ => None,
        }
    }
}

/// Payment status
///
/// Only completed payments reach the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COMPLETED" => Some(PaymentStatus::Completed),
            _ => None,
        }
    }
}

/// A payment to apply to a due
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    /// Bank or gateway reference
    pub reference: Option<String>,
    pub cashier_name: Option<String>,
    pub remarks: Option<String>,
}

impl PaymentRequest {
    pub fn new(amount: Money, payment_date: NaiveDate, method: PaymentMethod) -> Self {
        Self {
            amount,
            payment_date,
            method,
            reference: None,
            cashier_name: None,
            remarks: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_cashier(mut self, cashier: impl Into<String>) -> Self {
        self.cashier_name = Some(cashier.into());
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if !self.amount.is_positive() {
            return Err(LedgerError::invalid_argument(format!(
                "payment amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Immutable record of a payment applied to a due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub id: PaymentId,
    pub due_id: DueId,
    pub customer_id: CustomerId,
    pub enrollment_id: Option<EnrollmentId>,
    pub amount: Money,
    pub currency: Currency,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub receipt_number: String,
    pub cashier_name: Option<String>,
    pub status: PaymentStatus,
    pub remarks: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentHistory {
    fn record(
        entry: &DueLedgerEntry,
        request: &PaymentRequest,
        receipt_number: String,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new_v7(),
            due_id: entry.id,
            customer_id: entry.customer_id,
            enrollment_id: entry.enrollment_id,
            amount: request.amount,
            currency: request.amount.currency(),
            payment_date: request.payment_date,
            method: request.method,
            reference: request.reference.clone(),
            receipt_number,
            cashier_name: request.cashier_name.clone(),
            status: PaymentStatus::Completed,
            remarks: request.remarks.clone(),
            recorded_at,
        }
    }
}

/// Applies payments to dues
///
/// Each application reads the entry, adds the payment, and commits the
/// entry with its history record in one version-guarded store call. When a
/// concurrent writer gets there first, the applier re-reads and tries again
/// up to `max_attempts` times.
pub struct PaymentApplier {
    store: Arc<dyn DueLedgerPort>,
    clock: Arc<dyn Clock>,
    receipts: Arc<NumberGenerator>,
    max_attempts: u32,
}

impl PaymentApplier {
    pub fn new(store: Arc<dyn DueLedgerPort>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            receipts: Arc::new(NumberGenerator::receipts(0)),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Shares a receipt generator, e.g. one per process with its node id
    pub fn with_receipts(mut self, receipts: Arc<NumberGenerator>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Applies a payment and returns the receipt record
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the amount is not positive or the currency
    ///   differs from the due's
    /// - `InvalidState` if the due is cancelled or deleted
    /// - `NotFound` if the due does not exist
    /// - `ConcurrencyConflict` if every attempt lost to a concurrent writer
    #[instrument(skip(self, request), fields(due_id = %due_id, amount = %request.amount))]
    pub async fn apply_payment(
        &self,
        due_id: DueId,
        request: PaymentRequest,
    ) -> Result<PaymentHistory, LedgerError> {
        request.validate()?;
        let receipt_number = self.receipts.next(self.clock.now());

        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut entry = self.store.get_due(due_id).await?;
            let now = self.clock.now();
            entry.record_payment(request.amount, self.clock.today(), now)?;
            let history = PaymentHistory::record(&entry, &request, receipt_number.clone(), now);

            match self.store.commit_payment(&entry, &history).await {
                Ok(stored) => {
                    if stored.is_overpaid() {
                        warn!(
                            due_id = %due_id,
                            overpaid = %stored.overpaid_amount(),
                            "Payment exceeds net payable"
                        );
                    }
                    info!(
                        receipt = %history.receipt_number,
                        status = %stored.status,
                        outstanding = %stored.amount_outstanding,
                        "Payment applied"
                    );
                    return Ok(history);
                }
                Err(e) if e.is_conflict() => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, "Giving up on contended payment");
                        return Err(LedgerError::ConcurrencyConflict {
                            entity: "DueLedgerEntry".to_string(),
                            id: due_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(attempt, "Due changed concurrently, retrying payment");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
