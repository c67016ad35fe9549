//! Ledger reports
//!
//! Read-only questions asked of the ledger by cashiers and the registrar.
//! Every report goes through [`DueLedgerPort::query_dues`]; nothing here
//! writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;

use core_kernel::{Currency, CustomerId, DateRange, Money};

use crate::due::{DueLedgerEntry, DueStatus};
use crate::error::LedgerError;
use crate::ports::{DueLedgerPort, DueQuery};

/// Balance and arrears reports over the dues ledger
pub struct LedgerReports {
    store: Arc<dyn DueLedgerPort>,
}

impl LedgerReports {
    pub fn new(store: Arc<dyn DueLedgerPort>) -> Self {
        Self { store }
    }

    /// Sum of positive outstanding amounts of a customer's live dues
    ///
    /// Cancelled dues are left out; overpaid dues count as zero.
    pub async fn total_outstanding(
        &self,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Money, LedgerError> {
        let dues = self.customer_dues(customer_id, currency).await?;
        let outstanding: Vec<Money> = dues
            .iter()
            .filter(|d| d.status != DueStatus::Cancelled)
            .map(|d| d.amount_outstanding.max_zero())
            .collect();
        Ok(Money::sum(currency, outstanding.iter())?)
    }

    /// Sum of everything a customer has paid against their dues
    pub async fn total_paid(
        &self,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Money, LedgerError> {
        let dues = self.customer_dues(customer_id, currency).await?;
        Ok(Money::sum(currency, dues.iter().map(|d| &d.amount_paid))?)
    }

    /// Dues past their due date that still owe money
    pub async fn overdue(&self, today: NaiveDate) -> Result<Vec<DueLedgerEntry>, LedgerError> {
        let query = DueQuery::overdue(today).with_statuses([
            DueStatus::Pending,
            DueStatus::Partial,
            DueStatus::Overdue,
        ]);
        Ok(self.store.query_dues(&query).await?)
    }

    /// Dues whose scholarship has lapsed, still carrying the discount
    pub async fn expired_scholarships(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<DueLedgerEntry>, LedgerError> {
        let dues = self.store.query_dues(&DueQuery::default()).await?;
        Ok(dues
            .into_iter()
            .filter(|d| d.status != DueStatus::Cancelled && d.has_expired_scholarship(today))
            .collect())
    }

    /// Dues paid beyond their net payable
    pub async fn overpaid(&self) -> Result<Vec<DueLedgerEntry>, LedgerError> {
        let query = DueQuery::default().with_statuses([DueStatus::Paid]);
        let dues = self.store.query_dues(&query).await?;
        Ok(dues.into_iter().filter(DueLedgerEntry::is_overpaid).collect())
    }

    /// Number of live dues in each status
    pub async fn count_by_status(&self) -> Result<BTreeMap<&'static str, usize>, LedgerError> {
        let dues = self.store.query_dues(&DueQuery::default()).await?;
        let mut counts: BTreeMap<&'static str, usize> =
            DueStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for due in &dues {
            *counts.entry(due.status.as_str()).or_default() += 1;
        }
        Ok(counts)
    }

    /// Open dues falling due between today and `days` days from now
    pub async fn due_within(
        &self,
        today: NaiveDate,
        days: u32,
    ) -> Result<Vec<DueLedgerEntry>, LedgerError> {
        let query = DueQuery::default()
            .due_between(DateRange::following(today, days))
            .with_statuses([DueStatus::Pending, DueStatus::Partial])
            .outstanding_only();
        Ok(self.store.query_dues(&query).await?)
    }

    async fn customer_dues(
        &self,
        customer_id: CustomerId,
        currency: Currency,
    ) -> Result<Vec<DueLedgerEntry>, LedgerError> {
        let dues = self.store.query_dues(&DueQuery::for_customer(customer_id)).await?;
        Ok(dues.into_iter().filter(|d| d.currency == currency).collect())
    }
}
