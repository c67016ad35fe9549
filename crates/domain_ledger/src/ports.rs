//! Ledger Domain Ports
//!
//! Storage for dues, payment history, penalty records and invoices sits
//! behind these traits. Services hold them as `Arc<dyn ...>` so the same
//! logic runs against the in-memory store in tests and PostgreSQL in
//! production.
//!
//! # Versioned writes
//!
//! Every due carries a `version`. Writes are compare-and-swap: the adapter
//! only accepts an entry whose `version` matches the stored one, stores it
//! with `version + 1` and returns the stored copy. A mismatch is reported as
//! [`PortError::Conflict`] and nothing is written.
//!
//! ```rust,ignore
//! let mut entry = port.get_due(id).await?;
//! entry.record_payment(amount, today, now)?;
//! let stored = port.commit_payment(&entry, &history).await?; // CAS + insert
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;

use core_kernel::{CustomerId, DateRange, DomainPort, DueId, EnrollmentId, InvoiceId, PortError};

use crate::due::{DueLedgerEntry, DueStatus};
use crate::invoice::Invoice;
use crate::payment::PaymentHistory;
use crate::penalty::LatePaymentPenalty;

/// Query parameters for finding dues
///
/// All filters are conjunctive; unset filters match everything. Deleted
/// entries are excluded unless `include_deleted` is set. Results are ordered
/// by due date, then id.
#[derive(Debug, Clone, Default)]
pub struct DueQuery {
    pub customer_id: Option<CustomerId>,
    pub enrollment_id: Option<EnrollmentId>,
    /// Match any of these statuses; empty matches all
    pub statuses: Vec<DueStatus>,
    pub due_between: Option<DateRange>,
    pub academic_year: Option<String>,
    pub semester: Option<String>,
    /// Only entries with a positive outstanding amount
    pub outstanding_only: bool,
    /// Only entries whose due date is before this date and still owe money
    pub overdue_as_of: Option<NaiveDate>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl DueQuery {
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn for_enrollment(enrollment_id: EnrollmentId) -> Self {
        Self {
            enrollment_id: Some(enrollment_id),
            ..Default::default()
        }
    }

    pub fn overdue(as_of: NaiveDate) -> Self {
        Self {
            overdue_as_of: Some(as_of),
            ..Default::default()
        }
    }

    /// Entries the late penalty sweep has to look at on `today`
    pub fn penalty_candidates(today: NaiveDate) -> Self {
        Self {
            statuses: vec![DueStatus::Pending, DueStatus::Partial, DueStatus::Overdue],
            overdue_as_of: Some(today),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = DueStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn due_between(mut self, range: DateRange) -> Self {
        self.due_between = Some(range);
        self
    }

    pub fn academic_period(mut self, year: impl Into<String>, semester: Option<String>) -> Self {
        self.academic_year = Some(year.into());
        self.semester = semester;
        self
    }

    pub fn outstanding_only(mut self) -> Self {
        self.outstanding_only = true;
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Evaluates every filter except pagination against one entry
    pub fn matches(&self, entry: &DueLedgerEntry) -> bool {
        if !self.include_deleted && !entry.is_active() {
            return false;
        }
        if self.customer_id.is_some_and(|c| c != entry.customer_id) {
            return false;
        }
        if self.enrollment_id.is_some() && self.enrollment_id != entry.enrollment_id {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&entry.status) {
            return false;
        }
        if self.due_between.is_some_and(|r| !r.contains(entry.due_date)) {
            return false;
        }
        if self.academic_year.is_some() && self.academic_year != entry.academic_year {
            return false;
        }
        if self.semester.is_some() && self.semester != entry.semester {
            return false;
        }
        if self.outstanding_only && !entry.amount_outstanding.is_positive() {
            return false;
        }
        if let Some(as_of) = self.overdue_as_of {
            if !entry.is_overdue(as_of) {
                return false;
            }
        }
        true
    }
}

/// Storage port for dues and the records hanging off them
#[async_trait]
pub trait DueLedgerPort: DomainPort {
    // ========================================================================
    // Dues
    // ========================================================================

    /// Stores a new entry; its version becomes 1
    ///
    /// Returns `PortError::Duplicate` if the id already exists.
    async fn insert_due(&self, entry: DueLedgerEntry) -> Result<DueLedgerEntry, PortError>;

    /// Retrieves an entry by id, deleted or not
    async fn get_due(&self, id: DueId) -> Result<DueLedgerEntry, PortError>;

    /// Version-guarded update of an entry
    async fn update_due(&self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, PortError>;

    /// Finds entries matching the query
    async fn query_dues(&self, query: &DueQuery) -> Result<Vec<DueLedgerEntry>, PortError>;

    // ========================================================================
    // Atomic commits
    // ========================================================================

    /// Version-guarded update of the entry together with its payment record
    ///
    /// Either both are stored or neither is.
    async fn commit_payment(
        &self,
        entry: &DueLedgerEntry,
        payment: &PaymentHistory,
    ) -> Result<DueLedgerEntry, PortError>;

    /// Version-guarded update of the entry with an optional accrual record
    async fn commit_penalty(
        &self,
        entry: &DueLedgerEntry,
        penalty: Option<&LatePaymentPenalty>,
    ) -> Result<DueLedgerEntry, PortError>;

    // ========================================================================
    // History
    // ========================================================================

    /// Payments applied to a due, oldest first
    async fn payments_for_due(&self, id: DueId) -> Result<Vec<PaymentHistory>, PortError>;

    /// Penalty accrual records of a due, oldest first
    async fn penalties_for_due(&self, id: DueId) -> Result<Vec<LatePaymentPenalty>, PortError>;

    /// All payments made by a customer, oldest first
    async fn payments_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentHistory>, PortError>;
}

/// Storage port for invoices
#[async_trait]
pub trait InvoicePort: DomainPort {
    /// Stores an invoice with its line items and returns the stored copy
    ///
    /// Version 0 inserts a new invoice at version 1. Any other version
    /// replaces the stored invoice only if the versions match, and bumps it;
    /// otherwise `PortError::Conflict`.
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, PortError>;

    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError>;

    /// Active invoices of a customer, newest first
    async fn invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::due::NewDue;
    use chrono::Utc;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(customer_id: CustomerId, due_date: NaiveDate) -> DueLedgerEntry {
        let new = NewDue::new(customer_id, "TUITION", Money::new(dec!(1000), Currency::LKR), due_date)
            .with_academic_period("2024", "S1");
        DueLedgerEntry::open(new, date(2024, 1, 1), Utc::now()).unwrap()
    }

    #[test]
    fn test_default_query_matches_active_entries() {
        let mut e = entry(CustomerId::new(), date(2024, 2, 1));
        assert!(DueQuery::default().matches(&e));

        e.soft_delete(Utc::now(), None);
        assert!(!DueQuery::default().matches(&e));
        let with_deleted = DueQuery {
            include_deleted: true,
            ..Default::default()
        };
        assert!(with_deleted.matches(&e));
    }

    #[test]
    fn test_customer_and_period_filters() {
        let customer = CustomerId::new();
        let e = entry(customer, date(2024, 2, 1));

        assert!(DueQuery::for_customer(customer).matches(&e));
        assert!(!DueQuery::for_customer(CustomerId::new()).matches(&e));
        assert!(DueQuery::default().academic_period("2024", Some("S1".into())).matches(&e));
        assert!(!DueQuery::default().academic_period("2024", Some("S2".into())).matches(&e));
    }

    #[test]
    fn test_penalty_candidates() {
        let e = entry(CustomerId::new(), date(2024, 2, 1));
        assert!(!DueQuery::penalty_candidates(date(2024, 2, 1)).matches(&e));
        assert!(DueQuery::penalty_candidates(date(2024, 2, 2)).matches(&e));
    }

    #[test]
    fn test_due_between() {
        let e = entry(CustomerId::new(), date(2024, 2, 1));
        let range = DateRange::following(date(2024, 1, 25), 7);
        assert!(DueQuery::default().due_between(range).matches(&e));
        let earlier = DateRange::following(date(2024, 1, 1), 7);
        assert!(!DueQuery::default().due_between(earlier).matches(&e));
    }
}
