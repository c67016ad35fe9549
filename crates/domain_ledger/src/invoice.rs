//! Invoices
//!
//! An invoice groups billable lines for one customer: lines that bill the
//! remaining balance of a due, and free-standing charges. Totals are
//! derived by [`Invoice::calculate_totals`]:
//!
//! ```text
//! line_total = quantity * unit_price - discount
//! subtotal   = sum(line_total)
//! total      = subtotal - invoice discount + tax
//! amount_due = total - amount_paid
//! ```
//!
//! Stored invoices are versioned like dues. [`InvoiceAggregator`] re-reads
//! and retries when a save loses to a concurrent writer.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use core_kernel::{
    AuditMetadata, Clock, Currency, CustomerId, DueId, EnrollmentId, InvoiceId, LineItemId, Money,
};

use crate::due::DueLedgerEntry;
use crate::error::LedgerError;
use crate::numbering::NumberGenerator;
use crate::ports::{DueLedgerPort, DueQuery, InvoicePort};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Being drafted
    Draft,
    /// Sent to the customer
    Issued,
    /// Part paid
    Partial,
    Paid,
    /// Past due with nothing paid
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Issued => "ISSUED",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "ISSUED" => Some(InvoiceStatus::Issued),
            "PARTIAL" => Some(InvoiceStatus::Partial),
            "PAID" => Some(InvoiceStatus::Paid),
            "OVERDUE" => Some(InvoiceStatus::Overdue),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

/// A line on an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: LineItemId,
    /// Position on the invoice, starting at 1
    pub line_number: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    /// Percentage discount; when zero, `discount_amount` is taken as given
    pub discount_percentage: Decimal,
    pub discount_amount: Money,
    pub line_total: Money,
    /// The due this line bills, if any
    pub due_id: Option<DueId>,
}

impl InvoiceLineItem {
    /// Creates a line for one unit at `unit_price`
    ///
    /// The builder methods only set fields; the line total is refreshed by
    /// [`calculate_line_total`](Self::calculate_line_total), which
    /// [`Invoice::add_line_item`] runs.
    pub fn new(description: impl Into<String>, unit_price: Money) -> Self {
        Self {
            id: LineItemId::new_v7(),
            line_number: 0,
            description: description.into(),
            quantity: Decimal::ONE,
            unit_price,
            discount_percentage: Decimal::ZERO,
            discount_amount: Money::zero(unit_price.currency()),
            line_total: unit_price,
            due_id: None,
        }
    }

    /// A line billing what is left on a due, charges and penalties included
    pub fn for_due(entry: &DueLedgerEntry) -> Self {
        let description = match entry.installment_number {
            Some(n) => format!("{} installment {}", entry.category_code, n),
            None => entry.category_code.clone(),
        };
        let mut item = Self::new(description, entry.balance_with_charges());
        item.due_id = Some(entry.id);
        item
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_discount_percentage(mut self, percentage: Decimal) -> Self {
        self.discount_percentage = percentage;
        self
    }

    /// Fixed discount, used when no percentage is set
    pub fn with_discount_amount(mut self, discount: Money) -> Self {
        self.discount_amount = discount;
        self
    }

    /// Refreshes the discount (when percentage based) and the line total
    ///
    /// # Errors
    ///
    /// `Money(CurrencyMismatch)` if a fixed discount is in another currency
    /// than the unit price.
    pub fn calculate_line_total(&mut self) -> Result<(), LedgerError> {
        let gross = self.unit_price.multiply(self.quantity);
        if self.discount_percentage > Decimal::ZERO {
            self.discount_amount = gross.percentage(self.discount_percentage);
        }
        self.line_total = gross.checked_sub(&self.discount_amount)?;
        Ok(())
    }
}

/// A billable document for one customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub enrollment_id: Option<EnrollmentId>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub currency: Currency,
    pub line_items: Vec<InvoiceLineItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub status: InvoiceStatus,
    pub issued_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub audit: AuditMetadata,
    /// Optimistic-lock version; 0 until first stored
    pub version: u64,
}

impl Invoice {
    /// Creates an empty draft invoice
    ///
    /// # Arguments
    ///
    /// * `invoice_number` - Human-readable number, see [`NumberGenerator::invoices`]
    /// * `customer_id` - Customer being billed
    /// * `invoice_date` - Date printed on the invoice
    /// * `due_date` - Payment due date
    /// * `currency` - Currency of every line
    pub fn new(
        invoice_number: impl Into<String>,
        customer_id: CustomerId,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        currency: Currency,
    ) -> Self {
        let zero = Money::zero(currency);
        Self {
            id: InvoiceId::new_v7(),
            invoice_number: invoice_number.into(),
            customer_id,
            enrollment_id: None,
            invoice_date,
            due_date,
            currency,
            line_items: Vec::new(),
            subtotal: zero,
            discount_amount: zero,
            tax_amount: zero,
            total_amount: zero,
            amount_paid: zero,
            amount_due: zero,
            status: InvoiceStatus::Draft,
            issued_at: None,
            paid_at: None,
            notes: None,
            audit: AuditMetadata::now(),
            version: 0,
        }
    }

    pub fn for_enrollment(mut self, enrollment_id: EnrollmentId) -> Self {
        self.enrollment_id = Some(enrollment_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Appends a line; it takes the next line number
    pub fn add_line_item(&mut self, mut item: InvoiceLineItem) -> Result<(), LedgerError> {
        self.ensure_editable()?;
        self.ensure_currency(&item.unit_price)?;
        self.ensure_currency(&item.discount_amount)?;
        item.calculate_line_total()?;
        item.line_number = self.line_items.len() as u32 + 1;
        self.line_items.push(item);
        Ok(())
    }

    /// Appends a line billing the remaining balance of `entry`
    pub fn add_due(&mut self, entry: &DueLedgerEntry) -> Result<(), LedgerError> {
        if entry.customer_id != self.customer_id {
            return Err(LedgerError::invalid_argument(format!(
                "due {} belongs to another customer",
                entry.id
            )));
        }
        self.add_line_item(InvoiceLineItem::for_due(entry))
    }

    pub fn set_discount(&mut self, discount: Money) -> Result<(), LedgerError> {
        self.ensure_editable()?;
        self.ensure_currency(&discount)?;
        self.discount_amount = discount;
        Ok(())
    }

    pub fn set_tax(&mut self, tax: Money) -> Result<(), LedgerError> {
        self.ensure_editable()?;
        self.ensure_currency(&tax)?;
        self.tax_amount = tax;
        Ok(())
    }

    /// Refreshes every line, the totals and the status as of `today`
    ///
    /// A cancelled invoice keeps its status; nothing paid never counts as
    /// paid, even when the total is zero. `at` stamps `paid_at` when the
    /// invoice becomes paid.
    pub fn calculate_totals(&mut self, today: NaiveDate, at: DateTime<Utc>) -> Result<(), LedgerError> {
        for item in &mut self.line_items {
            item.calculate_line_total()?;
        }
        self.subtotal = Money::sum(self.currency, self.line_items.iter().map(|i| &i.line_total))?;
        self.total_amount = self
            .subtotal
            .checked_sub(&self.discount_amount)?
            .checked_add(&self.tax_amount)?;
        self.amount_due = self.total_amount.checked_sub(&self.amount_paid)?;

        if self.status == InvoiceStatus::Cancelled {
            return Ok(());
        }

        if self.amount_paid.is_zero() {
            if self.due_date < today {
                self.status = InvoiceStatus::Overdue;
            }
        } else if self.amount_paid >= self.total_amount {
            self.status = InvoiceStatus::Paid;
            if self.paid_at.is_none() {
                self.paid_at = Some(at);
            }
        } else {
            self.status = InvoiceStatus::Partial;
        }
        Ok(())
    }

    /// Moves a draft to issued
    pub fn issue(&mut self, today: NaiveDate, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status != InvoiceStatus::Draft {
            return Err(LedgerError::invalid_state(format!(
                "invoice {} is {}, only drafts can be issued",
                self.invoice_number,
                self.status.as_str()
            )));
        }
        if self.line_items.is_empty() {
            return Err(LedgerError::invalid_state(format!(
                "invoice {} has no lines",
                self.invoice_number
            )));
        }
        self.status = InvoiceStatus::Issued;
        self.issued_at = Some(at);
        self.audit.touch(at, None);
        self.calculate_totals(today, at)
    }

    /// Records a payment received against the invoice
    pub fn record_payment(
        &mut self,
        amount: Money,
        today: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(LedgerError::invalid_state(format!(
                "invoice {} is cancelled",
                self.invoice_number
            )));
        }
        if !amount.is_positive() {
            return Err(LedgerError::invalid_argument(format!(
                "payment amount must be positive, got {}",
                amount
            )));
        }
        self.ensure_currency(&amount)?;
        self.amount_paid = self.amount_paid.checked_add(&amount)?;
        self.audit.touch(at, None);
        self.calculate_totals(today, at)
    }

    pub fn cancel(&mut self, at: DateTime<Utc>, actor: Option<&str>) -> Result<(), LedgerError> {
        if self.status == InvoiceStatus::Paid {
            return Err(LedgerError::invalid_state(format!(
                "invoice {} is already paid",
                self.invoice_number
            )));
        }
        self.status = InvoiceStatus::Cancelled;
        self.audit.touch(at, actor);
        Ok(())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due_date < today
            && !matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    fn ensure_editable(&self) -> Result<(), LedgerError> {
        if matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
            return Err(LedgerError::invalid_state(format!(
                "invoice {} is {}",
                self.invoice_number,
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_currency(&self, amount: &Money) -> Result<(), LedgerError> {
        if amount.currency() != self.currency {
            return Err(LedgerError::invalid_argument(format!(
                "amount in {} on an invoice in {}",
                amount.currency(),
                self.currency
            )));
        }
        Ok(())
    }
}

/// Builds and settles invoices from the ledger
pub struct InvoiceAggregator {
    dues: Arc<dyn DueLedgerPort>,
    invoices: Arc<dyn InvoicePort>,
    clock: Arc<dyn Clock>,
    numbers: Arc<NumberGenerator>,
    max_attempts: u32,
}

impl InvoiceAggregator {
    pub fn new(
        dues: Arc<dyn DueLedgerPort>,
        invoices: Arc<dyn InvoicePort>,
        clock: Arc<dyn Clock>,
        numbers: Arc<NumberGenerator>,
    ) -> Self {
        Self {
            dues,
            invoices,
            clock,
            numbers,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Issues an invoice billing every open due of a customer
    ///
    /// # Errors
    ///
    /// `InvalidState` if the customer has nothing outstanding.
    pub async fn bill_outstanding(
        &self,
        customer_id: CustomerId,
        currency: Currency,
        due_date: NaiveDate,
    ) -> Result<Invoice, LedgerError> {
        let query = DueQuery::for_customer(customer_id).outstanding_only();
        let open: Vec<DueLedgerEntry> = self
            .dues
            .query_dues(&query)
            .await?
            .into_iter()
            .filter(|d| d.currency == currency && d.status.accrues_penalty())
            .collect();

        if open.is_empty() {
            return Err(LedgerError::invalid_state(format!(
                "customer {} has no open dues in {}",
                customer_id, currency
            )));
        }

        let today = self.clock.today();
        let now = self.clock.now();
        let mut invoice = Invoice::new(self.numbers.next(now), customer_id, today, due_date, currency);
        for entry in &open {
            invoice.add_due(entry)?;
        }
        invoice.issue(today, now)?;
        let invoice = self.invoices.save_invoice(&invoice).await?;

        info!(
            invoice = %invoice.invoice_number,
            customer_id = %customer_id,
            lines = invoice.line_items.len(),
            total = %invoice.total_amount,
            "Invoice issued"
        );
        Ok(invoice)
    }

    /// Records a payment against an invoice and stores the result
    ///
    /// # Errors
    ///
    /// `ConcurrencyConflict` if every attempt lost to a concurrent writer.
    #[instrument(skip(self, amount), fields(invoice_id = %invoice_id, amount = %amount))]
    pub async fn record_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Money,
    ) -> Result<Invoice, LedgerError> {
        self.update(invoice_id, |invoice, today, now| {
            invoice.record_payment(amount, today, now)
        })
        .await
    }

    /// Re-derives totals and status of a stored invoice as of today
    pub async fn refresh(&self, invoice_id: InvoiceId) -> Result<Invoice, LedgerError> {
        self.update(invoice_id, |invoice, today, now| invoice.calculate_totals(today, now))
            .await
    }

    /// Read, change, version-checked save; re-read on conflict
    async fn update<F>(&self, invoice_id: InvoiceId, change: F) -> Result<Invoice, LedgerError>
    where
        F: Fn(&mut Invoice, NaiveDate, DateTime<Utc>) -> Result<(), LedgerError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut invoice = self.invoices.get_invoice(invoice_id).await?;
            change(&mut invoice, self.clock.today(), self.clock.now())?;

            match self.invoices.save_invoice(&invoice).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, "Giving up on contended invoice");
                        return Err(LedgerError::ConcurrencyConflict {
                            entity: "Invoice".to_string(),
                            id: invoice_id.to_string(),
                            attempts: attempt,
                        });
                    }
                    warn!(attempt, "Invoice changed concurrently, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
