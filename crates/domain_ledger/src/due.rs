//! Due ledger entries
//!
//! A due is a single amount owed for an enrollment installment or an
//! ad-hoc charge. Its monetary figures are derived from a handful of inputs
//! and refreshed by [`DueLedgerEntry::recompute`]:
//!
//! ```text
//! scholarship      = round(original_rate * scholarship_pct / 100)
//! base             = gross_amount if > 0 else original_rate
//! net_payable      = base - scholarship - discount
//! total w/ charges = net_payable + service_charge + late_penalty
//! outstanding      = net_payable - amount_paid
//! ```
//!
//! # Status lifecycle
//!
//! ```text
//! Pending ──► Partial ──► Paid
//!    │           │         ▲
//!    └──► Overdue ◄┘───────┘
//!
//! any non-Paid state ──cancel──► Cancelled (sticky)
//! ```
//!
//! Full payment dominates: an entry whose payments cover the net payable is
//! `Paid` no matter how late. The late penalty is carried in the total with
//! charges and never folded into the outstanding figure.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    days_between, AuditMetadata, Currency, CustomerId, DueId, EnrollmentId, Money, Rate,
};

use crate::enrollment::{validate_percentage, Enrollment};
use crate::error::LedgerError;

/// Payment status of a due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DueStatus {
    Pending,
    Partial,
    Paid,
    Overdue,
    Cancelled,
}

impl DueStatus {
    pub const ALL: [DueStatus; 5] = [
        DueStatus::Pending,
        DueStatus::Partial,
        DueStatus::Paid,
        DueStatus::Overdue,
        DueStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DueStatus::Pending => "PENDING",
            DueStatus::Partial => "PARTIAL",
            DueStatus::Paid => "PAID",
            DueStatus::Overdue => "OVERDUE",
            DueStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(DueStatus::Pending),
            "PARTIAL" => Some(DueStatus::Partial),
            "PAID" => Some(DueStatus::Paid),
            "OVERDUE" => Some(DueStatus::Overdue),
            "CANCELLED" => Some(DueStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses the late penalty sweep looks at
    pub fn accrues_penalty(&self) -> bool {
        matches!(self, DueStatus::Pending | DueStatus::Partial | DueStatus::Overdue)
    }
}

impl std::fmt::Display for DueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for opening a new due
///
/// Dues are created by the institution's schedule; this carries everything
/// the schedule supplies. Derived figures are computed on open.
#[derive(Debug, Clone)]
pub struct NewDue {
    pub customer_id: CustomerId,
    pub enrollment_id: Option<EnrollmentId>,
    pub installment_number: Option<u32>,
    pub category_code: String,
    pub original_rate: Money,
    pub gross_amount: Option<Money>,
    pub scholarship_percentage: Decimal,
    pub scholarship_expiry_date: Option<NaiveDate>,
    pub discount_amount: Option<Money>,
    pub service_charge_amount: Option<Money>,
    pub due_date: NaiveDate,
    pub invoice_reference: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub academic_year: Option<String>,
    pub semester: Option<String>,
    pub is_refundable: bool,
    pub is_transferable: bool,
    pub remarks: Option<String>,
}

impl NewDue {
    pub fn new(
        customer_id: CustomerId,
        category_code: impl Into<String>,
        original_rate: Money,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            customer_id,
            enrollment_id: None,
            installment_number: None,
            category_code: category_code.into(),
            original_rate,
            gross_amount: None,
            scholarship_percentage: Decimal::ZERO,
            scholarship_expiry_date: None,
            discount_amount: None,
            service_charge_amount: None,
            due_date,
            invoice_reference: None,
            invoice_date: None,
            academic_year: None,
            semester: None,
            is_refundable: false,
            is_transferable: false,
            remarks: None,
        }
    }

    /// An installment of an enrollment's program fee
    ///
    /// The enrollment's scholarship percentage carries over to the installment.
    pub fn installment(
        enrollment: &Enrollment,
        installment_number: u32,
        amount: Money,
        due_date: NaiveDate,
    ) -> Self {
        let mut due = Self::new(enrollment.customer_id, "TUITION", amount, due_date);
        due.enrollment_id = Some(enrollment.id);
        due.installment_number = Some(installment_number);
        due.scholarship_percentage = enrollment.scholarship_percentage();
        due
    }

    pub fn with_scholarship(mut self, percentage: Decimal, expires: Option<NaiveDate>) -> Self {
        self.scholarship_percentage = percentage;
        self.scholarship_expiry_date = expires;
        self
    }

    pub fn with_gross_amount(mut self, gross: Money) -> Self {
        self.gross_amount = Some(gross);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount_amount = Some(discount);
        self
    }

    pub fn with_service_charge(mut self, charge: Money) -> Self {
        self.service_charge_amount = Some(charge);
        self
    }

    pub fn with_academic_period(mut self, year: impl Into<String>, semester: impl Into<String>) -> Self {
        self.academic_year = Some(year.into());
        self.semester = Some(semester.into());
        self
    }

    pub fn with_invoice_reference(mut self, reference: impl Into<String>, date: NaiveDate) -> Self {
        self.invoice_reference = Some(reference.into());
        self.invoice_date = Some(date);
        self
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

/// A single owed amount and its payment progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueLedgerEntry {
    pub id: DueId,
    /// Optimistic-lock version; bumped by the store on every write
    pub version: u64,
    pub customer_id: CustomerId,
    pub enrollment_id: Option<EnrollmentId>,
    pub installment_number: Option<u32>,
    pub category_code: String,
    pub currency: Currency,
    pub invoice_reference: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub academic_year: Option<String>,
    pub semester: Option<String>,

    pub original_rate: Money,
    pub gross_amount: Money,
    pub scholarship_percentage: Decimal,
    pub scholarship_amount: Money,
    pub scholarship_expiry_date: Option<NaiveDate>,
    pub discount_amount: Money,
    pub net_payable_amount: Money,
    pub service_charge_amount: Money,
    pub late_penalty_rate: Rate,
    pub late_penalty_amount: Money,
    pub total_amount_with_charges: Money,
    pub amount_paid: Money,
    pub amount_outstanding: Money,

    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub status: DueStatus,
    pub is_refundable: bool,
    pub is_transferable: bool,
    pub remarks: Option<String>,
    pub audit: AuditMetadata,
}

impl DueLedgerEntry {
    /// Opens a due and derives its figures as of `today`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for negative amounts, an out-of-range scholarship
    /// percentage, or amounts in different currencies.
    pub fn open(new: NewDue, today: NaiveDate, at: DateTime<Utc>) -> Result<Self, LedgerError> {
        let currency = new.original_rate.currency();
        let zero = Money::zero(currency);
        validate_percentage(new.scholarship_percentage)?;

        let gross_amount = new.gross_amount.unwrap_or(zero);
        let discount_amount = new.discount_amount.unwrap_or(zero);
        let service_charge_amount = new.service_charge_amount.unwrap_or(zero);
        for (name, amount) in [
            ("original rate", new.original_rate),
            ("gross amount", gross_amount),
            ("discount", discount_amount),
            ("service charge", service_charge_amount),
        ] {
            if amount.currency() != currency {
                return Err(LedgerError::invalid_argument(format!(
                    "{} is in {}, due is in {}",
                    name,
                    amount.currency(),
                    currency
                )));
            }
            if amount.is_negative() {
                return Err(LedgerError::invalid_argument(format!(
                    "{} must not be negative, got {}",
                    name, amount
                )));
            }
        }

        let mut entry = Self {
            id: DueId::new_v7(),
            version: 0,
            customer_id: new.customer_id,
            enrollment_id: new.enrollment_id,
            installment_number: new.installment_number,
            category_code: new.category_code,
            currency,
            invoice_reference: new.invoice_reference,
            invoice_date: new.invoice_date,
            academic_year: new.academic_year,
            semester: new.semester,
            original_rate: new.original_rate,
            gross_amount,
            scholarship_percentage: new.scholarship_percentage,
            scholarship_amount: zero,
            scholarship_expiry_date: new.scholarship_expiry_date,
            discount_amount,
            net_payable_amount: zero,
            service_charge_amount,
            late_penalty_rate: Rate::zero(),
            late_penalty_amount: zero,
            total_amount_with_charges: zero,
            amount_paid: zero,
            amount_outstanding: zero,
            due_date: new.due_date,
            paid_date: None,
            status: DueStatus::Pending,
            is_refundable: new.is_refundable,
            is_transferable: new.is_transferable,
            remarks: new.remarks,
            audit: AuditMetadata::created(at),
        };
        entry.recompute(today)?;
        Ok(entry)
    }

    /// Refreshes every derived figure and the payment status as of `today`
    ///
    /// A cancelled entry keeps its status; its amounts are still refreshed.
    pub fn recompute(&mut self, today: NaiveDate) -> Result<(), LedgerError> {
        self.recompute_amounts()?;

        if self.status == DueStatus::Cancelled {
            return Ok(());
        }

        self.status = if self.amount_paid >= self.net_payable_amount {
            if self.paid_date.is_none() {
                self.paid_date = Some(today);
            }
            DueStatus::Paid
        } else if self.amount_paid.is_positive() {
            DueStatus::Partial
        } else if self.due_date < today {
            DueStatus::Overdue
        } else {
            DueStatus::Pending
        };
        Ok(())
    }

    fn recompute_amounts(&mut self) -> Result<(), LedgerError> {
        self.scholarship_amount = self.original_rate.percentage(self.scholarship_percentage);

        let base = if self.gross_amount.is_positive() {
            self.gross_amount
        } else {
            self.original_rate
        };
        self.net_payable_amount = base
            .checked_sub(&self.scholarship_amount)?
            .checked_sub(&self.discount_amount)?;

        self.total_amount_with_charges = self
            .net_payable_amount
            .checked_add(&self.service_charge_amount)?
            .checked_add(&self.late_penalty_amount)?;

        self.amount_outstanding = self.net_payable_amount.checked_sub(&self.amount_paid)?;
        Ok(())
    }

    /// Checks that a payment may be applied to this entry
    pub fn ensure_accepts_payment(&self) -> Result<(), LedgerError> {
        if self.audit.is_deleted() {
            return Err(LedgerError::invalid_state(format!("due {} has been deleted", self.id)));
        }
        if self.status == DueStatus::Cancelled {
            return Err(LedgerError::invalid_state(format!("due {} is cancelled", self.id)));
        }
        Ok(())
    }

    /// Adds a payment to the amount paid and refreshes the entry
    ///
    /// Payments beyond the net payable are accepted; see [`Self::is_overpaid`].
    pub fn record_payment(
        &mut self,
        amount: Money,
        today: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.ensure_accepts_payment()?;
        if !amount.is_positive() {
            return Err(LedgerError::invalid_argument(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        if amount.currency() != self.currency {
            return Err(LedgerError::invalid_argument(format!(
                "payment in {} cannot be applied to a due in {}",
                amount.currency(),
                self.currency
            )));
        }

        self.amount_paid = self.amount_paid.checked_add(&amount)?;
        self.recompute(today)?;
        self.audit.touch(at, None);
        Ok(())
    }

    /// Replaces the late penalty figure and marks the entry overdue
    pub fn apply_late_penalty(
        &mut self,
        rate: Rate,
        amount: Money,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if amount.currency() != self.currency {
            return Err(LedgerError::invalid_argument(format!(
                "penalty in {} cannot be applied to a due in {}",
                amount.currency(),
                self.currency
            )));
        }
        self.late_penalty_rate = rate;
        self.late_penalty_amount = amount;
        self.recompute_amounts()?;
        self.status = DueStatus::Overdue;
        self.audit.touch(at, Some("late-penalty-sweep"));
        Ok(())
    }

    /// Cancels the entry; paid entries cannot be cancelled
    pub fn cancel(&mut self, at: DateTime<Utc>, actor: Option<&str>) -> Result<(), LedgerError> {
        if self.status == DueStatus::Paid {
            return Err(LedgerError::invalid_state(format!(
                "due {} is already paid",
                self.id
            )));
        }
        self.status = DueStatus::Cancelled;
        self.audit.touch(at, actor);
        Ok(())
    }

    pub fn soft_delete(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.audit.soft_delete(at, actor);
    }

    pub fn restore(&mut self, at: DateTime<Utc>, actor: Option<&str>) {
        self.audit.restore(at, actor);
    }

    pub fn is_active(&self) -> bool {
        self.audit.is_active()
    }

    /// Past its due date with something left to pay
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today && self.amount_outstanding.is_positive()
    }

    /// Whole days past the due date; zero when not overdue
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if !self.is_overdue(today) {
            return 0;
        }
        days_between(self.due_date, today)
    }

    /// Whole weeks past the due date; zero when not overdue
    pub fn weeks_overdue(&self, today: NaiveDate) -> i64 {
        self.days_overdue(today) / 7
    }

    pub fn is_overpaid(&self) -> bool {
        self.amount_paid > self.net_payable_amount
    }

    /// How much was paid beyond the net payable
    pub fn overpaid_amount(&self) -> Money {
        (-self.amount_outstanding).max_zero()
    }

    /// Remaining balance including service charges and penalties
    pub fn balance_with_charges(&self) -> Money {
        self.total_amount_with_charges - self.amount_paid
    }

    pub fn has_expired_scholarship(&self, today: NaiveDate) -> bool {
        self.scholarship_percentage > Decimal::ZERO
            && self.scholarship_expiry_date.map_or(false, |expiry| expiry < today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lkr(amount: Decimal) -> Money {
        Money::new(amount, Currency::LKR)
    }

    fn due(rate: Decimal, pct: Decimal, due_date: NaiveDate, today: NaiveDate) -> DueLedgerEntry {
        let new = NewDue::new(CustomerId::new(), "TUITION", lkr(rate), due_date)
            .with_scholarship(pct, None);
        DueLedgerEntry::open(new, today, Utc::now()).unwrap()
    }

    #[test]
    fn test_open_derives_figures() {
        let entry = due(dec!(100000.00), dec!(20), date(2024, 3, 1), date(2024, 1, 1));
        assert_eq!(entry.scholarship_amount.amount(), dec!(20000.00));
        assert_eq!(entry.net_payable_amount.amount(), dec!(80000.00));
        assert_eq!(entry.amount_outstanding.amount(), dec!(80000.00));
        assert_eq!(entry.total_amount_with_charges.amount(), dec!(80000.00));
        assert_eq!(entry.status, DueStatus::Pending);
        assert_eq!(entry.version, 0);
    }

    #[test]
    fn test_gross_amount_overrides_base() {
        let new = NewDue::new(CustomerId::new(), "TUITION", lkr(dec!(1000)), date(2024, 3, 1))
            .with_gross_amount(lkr(dec!(1200)))
            .with_scholarship(dec!(10), None)
            .with_discount(lkr(dec!(50)))
            .with_service_charge(lkr(dec!(25)));
        let entry = DueLedgerEntry::open(new, date(2024, 1, 1), Utc::now()).unwrap();

        // scholarship is taken from the original rate, not the gross
        assert_eq!(entry.scholarship_amount.amount(), dec!(100.00));
        assert_eq!(entry.net_payable_amount.amount(), dec!(1050.00));
        assert_eq!(entry.total_amount_with_charges.amount(), dec!(1075.00));
    }

    #[test]
    fn test_open_rejects_mixed_currency() {
        let new = NewDue::new(CustomerId::new(), "LAB", lkr(dec!(1000)), date(2024, 3, 1))
            .with_discount(Money::new(dec!(5), Currency::USD));
        assert!(matches!(
            DueLedgerEntry::open(new, date(2024, 1, 1), Utc::now()),
            Err(LedgerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_partial_payment() {
        let mut entry = due(dec!(100000.00), dec!(20), date(2024, 3, 1), date(2024, 1, 1));
        entry.record_payment(lkr(dec!(30000.00)), date(2024, 1, 10), Utc::now()).unwrap();
        assert_eq!(entry.status, DueStatus::Partial);
        assert_eq!(entry.amount_outstanding.amount(), dec!(50000.00));
        assert!(entry.paid_date.is_none());
    }

    #[test]
    fn test_full_payment_dominates_overdue() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 1, 1), date(2024, 1, 1));
        entry.recompute(date(2024, 2, 1)).unwrap();
        assert_eq!(entry.status, DueStatus::Overdue);

        entry.record_payment(lkr(dec!(1000)), date(2024, 2, 1), Utc::now()).unwrap();
        assert_eq!(entry.status, DueStatus::Paid);
        assert_eq!(entry.paid_date, Some(date(2024, 2, 1)));
    }

    #[test]
    fn test_paid_date_not_overwritten() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 1, 1), date(2024, 1, 1));
        entry.record_payment(lkr(dec!(1000)), date(2024, 1, 5), Utc::now()).unwrap();
        entry.recompute(date(2024, 3, 1)).unwrap();
        assert_eq!(entry.paid_date, Some(date(2024, 1, 5)));
    }

    #[test]
    fn test_overpayment_is_kept() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 3, 1), date(2024, 1, 1));
        entry.record_payment(lkr(dec!(1250)), date(2024, 1, 5), Utc::now()).unwrap();
        assert!(entry.is_overpaid());
        assert_eq!(entry.overpaid_amount().amount(), dec!(250));
        assert_eq!(entry.amount_outstanding.amount(), dec!(-250));
        assert_eq!(entry.status, DueStatus::Paid);
    }

    #[test]
    fn test_record_payment_rejects_bad_input() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 3, 1), date(2024, 1, 1));
        assert!(entry.record_payment(lkr(dec!(0)), date(2024, 1, 5), Utc::now()).is_err());
        assert!(entry.record_payment(lkr(dec!(-5)), date(2024, 1, 5), Utc::now()).is_err());
        assert!(entry
            .record_payment(Money::new(dec!(5), Currency::USD), date(2024, 1, 5), Utc::now())
            .is_err());
        assert!(entry.amount_paid.is_zero());
    }

    #[test]
    fn test_cancelled_is_sticky() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 1, 1), date(2024, 1, 1));
        entry.cancel(Utc::now(), Some("registrar")).unwrap();
        entry.recompute(date(2024, 5, 1)).unwrap();
        assert_eq!(entry.status, DueStatus::Cancelled);
        assert!(matches!(
            entry.record_payment(lkr(dec!(10)), date(2024, 5, 1), Utc::now()),
            Err(LedgerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_paid_entry_cannot_be_cancelled() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 3, 1), date(2024, 1, 1));
        entry.record_payment(lkr(dec!(1000)), date(2024, 1, 5), Utc::now()).unwrap();
        assert!(entry.cancel(Utc::now(), None).is_err());
    }

    #[test]
    fn test_deleted_entry_rejects_payment() {
        let mut entry = due(dec!(1000), dec!(0), date(2024, 3, 1), date(2024, 1, 1));
        entry.soft_delete(Utc::now(), Some("admin"));
        assert!(!entry.is_active());
        assert!(entry.record_payment(lkr(dec!(10)), date(2024, 1, 5), Utc::now()).is_err());
        entry.restore(Utc::now(), Some("admin"));
        assert!(entry.record_payment(lkr(dec!(10)), date(2024, 1, 5), Utc::now()).is_ok());
    }

    #[test]
    fn test_overdue_counts() {
        let entry = due(dec!(50000), dec!(0), date(2024, 1, 1), date(2024, 1, 1));
        assert!(!entry.is_overdue(date(2024, 1, 1)));
        assert_eq!(entry.days_overdue(date(2024, 1, 1)), 0);
        assert_eq!(entry.days_overdue(date(2024, 1, 20)), 19);
        assert_eq!(entry.weeks_overdue(date(2024, 1, 20)), 2);
    }

    #[test]
    fn test_penalty_is_additive_to_charges() {
        let mut entry = due(dec!(50000.00), dec!(0), date(2024, 1, 1), date(2024, 1, 1));
        entry
            .apply_late_penalty(Rate::new(dec!(0.01)), lkr(dec!(500.00)), Utc::now())
            .unwrap();
        assert_eq!(entry.status, DueStatus::Overdue);
        assert_eq!(entry.amount_outstanding.amount(), dec!(50000.00));
        assert_eq!(entry.total_amount_with_charges.amount(), dec!(50500.00));
        assert_eq!(entry.balance_with_charges().amount(), dec!(50500.00));
    }

    #[test]
    fn test_expired_scholarship() {
        let new = NewDue::new(CustomerId::new(), "TUITION", lkr(dec!(1000)), date(2024, 3, 1))
            .with_scholarship(dec!(25), Some(date(2024, 2, 1)));
        let entry = DueLedgerEntry::open(new, date(2024, 1, 1), Utc::now()).unwrap();
        assert!(!entry.has_expired_scholarship(date(2024, 2, 1)));
        assert!(entry.has_expired_scholarship(date(2024, 2, 2)));
    }

    #[test]
    fn test_status_strings() {
        for status in DueStatus::ALL {
            assert_eq!(DueStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_string(&DueStatus::Overdue).unwrap(),
            "\"OVERDUE\""
        );
    }
}
