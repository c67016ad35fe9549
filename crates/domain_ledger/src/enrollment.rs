//! Enrollments and the program fee split
//!
//! An enrollment fixes the fee a customer owes for a program and the share
//! of it covered by a scholarship. [`compute_fee`] is the single place the
//! split is calculated; dues seeded from an enrollment reuse its figures.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{AuditMetadata, Currency, CustomerId, EnrollmentId, Money, ProgramId};

use crate::error::LedgerError;

/// Result of splitting a fee into scholarship and net payable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub scholarship_amount: Money,
    pub net_payable: Money,
}

/// Splits `original_fee` into the scholarship share and what remains payable
///
/// The scholarship is `original_fee * pct / 100`, rounded half-up to the
/// currency scale. The net payable is the exact remainder, so the two parts
/// always add back up to the fee.
///
/// # Errors
///
/// Returns `InvalidArgument` if the percentage is outside `[0, 100]` or the
/// fee is negative.
pub fn compute_fee(
    original_fee: Money,
    scholarship_percentage: Decimal,
) -> Result<FeeBreakdown, LedgerError> {
    validate_percentage(scholarship_percentage)?;
    if original_fee.is_negative() {
        return Err(LedgerError::invalid_argument(format!(
            "fee must not be negative, got {}",
            original_fee
        )));
    }

    let scholarship_amount = original_fee.percentage(scholarship_percentage);
    let net_payable = original_fee.checked_sub(&scholarship_amount)?;

    Ok(FeeBreakdown {
        scholarship_amount,
        net_payable,
    })
}

pub(crate) fn validate_percentage(percentage: Decimal) -> Result<(), LedgerError> {
    if percentage < Decimal::ZERO || percentage > dec!(100) {
        return Err(LedgerError::invalid_argument(format!(
            "scholarship percentage must be between 0 and 100, got {}",
            percentage
        )));
    }
    Ok(())
}

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Suspended,
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "ACTIVE",
            EnrollmentStatus::Completed => "COMPLETED",
            EnrollmentStatus::Suspended => "SUSPENDED",
            EnrollmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(EnrollmentStatus::Active),
            "COMPLETED" => Some(EnrollmentStatus::Completed),
            "SUSPENDED" => Some(EnrollmentStatus::Suspended),
            "CANCELLED" => Some(EnrollmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled enrollments accept no further changes
    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentStatus::Completed | EnrollmentStatus::Cancelled)
    }
}

/// A customer's enrollment in a program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub customer_id: CustomerId,
    pub program_id: ProgramId,
    /// Human-readable reference, unique per institution
    pub reference: String,
    pub enrollment_date: NaiveDate,
    pub expected_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<NaiveDate>,
    pub status: EnrollmentStatus,
    pub currency: Currency,
    original_fee: Money,
    scholarship_percentage: Decimal,
    scholarship_amount: Money,
    net_payable_amount: Money,
    pub remarks: Option<String>,
    pub audit: AuditMetadata,
}

impl Enrollment {
    /// Creates an active enrollment with the fee split already derived
    pub fn new(
        customer_id: CustomerId,
        program_id: ProgramId,
        reference: impl Into<String>,
        enrollment_date: NaiveDate,
        original_fee: Money,
        scholarship_percentage: Decimal,
    ) -> Result<Self, LedgerError> {
        let breakdown = compute_fee(original_fee, scholarship_percentage)?;

        Ok(Self {
            id: EnrollmentId::new_v7(),
            customer_id,
            program_id,
            reference: reference.into(),
            enrollment_date,
            expected_completion_date: None,
            actual_completion_date: None,
            status: EnrollmentStatus::Active,
            currency: original_fee.currency(),
            original_fee,
            scholarship_percentage,
            scholarship_amount: breakdown.scholarship_amount,
            net_payable_amount: breakdown.net_payable,
            remarks: None,
            audit: AuditMetadata::now(),
        })
    }

    pub fn with_expected_completion(mut self, date: NaiveDate) -> Self {
        self.expected_completion_date = Some(date);
        self
    }

    pub fn original_fee(&self) -> Money {
        self.original_fee
    }

    pub fn scholarship_percentage(&self) -> Decimal {
        self.scholarship_percentage
    }

    pub fn scholarship_amount(&self) -> Money {
        self.scholarship_amount
    }

    pub fn net_payable_amount(&self) -> Money {
        self.net_payable_amount
    }

    /// Changes the program fee and re-derives the split
    pub fn change_fee(&mut self, original_fee: Money, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_modifiable()?;
        if original_fee.currency() != self.currency {
            return Err(LedgerError::invalid_argument(format!(
                "fee currency {} does not match enrollment currency {}",
                original_fee.currency(),
                self.currency
            )));
        }
        let breakdown = compute_fee(original_fee, self.scholarship_percentage)?;
        self.original_fee = original_fee;
        self.apply(breakdown, at);
        Ok(())
    }

    /// Changes the scholarship percentage and re-derives the split
    pub fn change_scholarship(
        &mut self,
        scholarship_percentage: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.ensure_modifiable()?;
        let breakdown = compute_fee(self.original_fee, scholarship_percentage)?;
        self.scholarship_percentage = scholarship_percentage;
        self.apply(breakdown, at);
        Ok(())
    }

    pub fn suspend(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(EnrollmentStatus::Suspended, at)
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != EnrollmentStatus::Suspended {
            return Err(LedgerError::invalid_state(format!(
                "only suspended enrollments can be reactivated, status is {}",
                self.status.as_str()
            )));
        }
        self.transition(EnrollmentStatus::Active, at)
    }

    pub fn complete(&mut self, on: NaiveDate, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(EnrollmentStatus::Completed, at)?;
        self.actual_completion_date = Some(on);
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(EnrollmentStatus::Cancelled, at)
    }

    /// Retires the enrollment; records are never physically removed
    pub fn retire(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.audit.soft_delete(at, actor);
    }

    fn transition(&mut self, to: EnrollmentStatus, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.ensure_modifiable()?;
        self.status = to;
        self.audit.touch(at, None);
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::invalid_state(format!(
                "enrollment {} is {}",
                self.reference,
                self.status.as_str()
            )));
        }
        if self.audit.is_deleted() {
            return Err(LedgerError::invalid_state(format!(
                "enrollment {} has been retired",
                self.reference
            )));
        }
        Ok(())
    }

    fn apply(&mut self, breakdown: FeeBreakdown, at: DateTime<Utc>) {
        self.scholarship_amount = breakdown.scholarship_amount;
        self.net_payable_amount = breakdown.net_payable;
        self.audit.touch(at, None);
    }
}
