//! Test Data Builders
//!
//! Builders for ledger records with sensible defaults, so tests only spell
//! out the fields they care about.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use core_kernel::{Currency, CustomerId, EnrollmentId, Money};
use domain_ledger::{DueLedgerEntry, Invoice, InvoiceLineItem, NewDue, PaymentMethod, PaymentRequest};

use crate::fixtures::{DateFixtures, MoneyFixtures, PartyFixtures};

/// Builder for dues
///
/// Defaults to a 1,000 tuition due on 1 February 2024, opened on
/// 1 January 2024 with nothing paid.
#[derive(Debug, Clone)]
pub struct DueBuilder {
    customer_id: CustomerId,
    enrollment_id: Option<EnrollmentId>,
    installment_number: Option<u32>,
    category_code: String,
    original_rate: Money,
    gross_amount: Option<Money>,
    scholarship_percentage: Decimal,
    scholarship_expiry_date: Option<NaiveDate>,
    discount: Option<Money>,
    service_charge: Option<Money>,
    due_date: NaiveDate,
    academic_year: Option<String>,
    semester: Option<String>,
    paid: Option<Money>,
    opened_on: NaiveDate,
    recorded_at: DateTime<Utc>,
}

impl Default for DueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DueBuilder {
    pub fn new() -> Self {
        Self {
            customer_id: PartyFixtures::customer_id(),
            enrollment_id: None,
            installment_number: None,
            category_code: "TUITION".to_string(),
            original_rate: MoneyFixtures::lkr_1000(),
            gross_amount: None,
            scholarship_percentage: Decimal::ZERO,
            scholarship_expiry_date: None,
            discount: None,
            service_charge: None,
            due_date: DateFixtures::first_due_date(),
            academic_year: Some("2024".to_string()),
            semester: Some("S1".to_string()),
            paid: None,
            opened_on: DateFixtures::term_start(),
            recorded_at: DateFixtures::recorded_at(),
        }
    }

    pub fn customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = customer_id;
        self
    }

    pub fn installment(mut self, enrollment_id: EnrollmentId, number: u32) -> Self {
        self.enrollment_id = Some(enrollment_id);
        self.installment_number = Some(number);
        self
    }

    pub fn category(mut self, code: impl Into<String>) -> Self {
        self.category_code = code.into();
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.original_rate = amount;
        self
    }

    pub fn gross(mut self, gross: Money) -> Self {
        self.gross_amount = Some(gross);
        self
    }

    pub fn scholarship(mut self, percentage: Decimal, expires: Option<NaiveDate>) -> Self {
        self.scholarship_percentage = percentage;
        self.scholarship_expiry_date = expires;
        self
    }

    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn service_charge(mut self, charge: Money) -> Self {
        self.service_charge = Some(charge);
        self
    }

    pub fn due_on(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn academic_period(mut self, year: impl Into<String>, semester: impl Into<String>) -> Self {
        self.academic_year = Some(year.into());
        self.semester = Some(semester.into());
        self
    }

    /// Records one payment of `amount` right after opening
    pub fn paid(mut self, amount: Money) -> Self {
        self.paid = Some(amount);
        self
    }

    /// Business date the due is opened (and paid) on
    pub fn opened_on(mut self, date: NaiveDate) -> Self {
        self.opened_on = date;
        self
    }

    pub fn new_due(&self) -> NewDue {
        let mut new = NewDue::new(
            self.customer_id,
            self.category_code.clone(),
            self.original_rate,
            self.due_date,
        )
        .with_scholarship(self.scholarship_percentage, self.scholarship_expiry_date);
        new.enrollment_id = self.enrollment_id;
        new.installment_number = self.installment_number;
        new.academic_year = self.academic_year.clone();
        new.semester = self.semester.clone();
        if let Some(gross) = self.gross_amount {
            new = new.with_gross_amount(gross);
        }
        if let Some(discount) = self.discount {
            new = new.with_discount(discount);
        }
        if let Some(charge) = self.service_charge {
            new = new.with_service_charge(charge);
        }
        new
    }

    /// Opens the due
    ///
    /// # Panics
    ///
    /// Panics if the configured figures are rejected
    pub fn build(self) -> DueLedgerEntry {
        let mut entry = DueLedgerEntry::open(self.new_due(), self.opened_on, self.recorded_at)
            .expect("DueBuilder produced an invalid due");
        if let Some(amount) = self.paid {
            entry
                .record_payment(amount, self.opened_on, self.recorded_at)
                .expect("DueBuilder payment rejected");
        }
        entry
    }
}

/// Builder for invoices
#[derive(Debug)]
pub struct InvoiceBuilder {
    number: String,
    customer_id: CustomerId,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    lines: Vec<InvoiceLineItem>,
    dues: Vec<DueLedgerEntry>,
}

impl InvoiceBuilder {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            number: "INV-TEST-000001".to_string(),
            customer_id,
            invoice_date: DateFixtures::term_start(),
            due_date: DateFixtures::first_due_date(),
            lines: Vec::new(),
            dues: Vec::new(),
        }
    }

    pub fn number(mut self, number: impl Into<String>) -> Self {
        self.number = number.into();
        self
    }

    pub fn due_on(mut self, due_date: NaiveDate) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn line(mut self, description: impl Into<String>, unit_price: Money) -> Self {
        self.lines.push(InvoiceLineItem::new(description, unit_price));
        self
    }

    /// Bills the remaining balance of `entry`
    pub fn due(mut self, entry: DueLedgerEntry) -> Self {
        self.dues.push(entry);
        self
    }

    /// Builds a draft invoice with totals calculated as of the invoice date
    ///
    /// # Panics
    ///
    /// Panics if a line is rejected
    pub fn build(self) -> Invoice {
        let mut invoice = Invoice::new(
            self.number,
            self.customer_id,
            self.invoice_date,
            self.due_date,
            Currency::LKR,
        );
        for line in self.lines {
            invoice.add_line_item(line).expect("InvoiceBuilder line rejected");
        }
        for entry in &self.dues {
            invoice.add_due(entry).expect("InvoiceBuilder due rejected");
        }
        invoice
            .calculate_totals(self.invoice_date, DateFixtures::recorded_at())
            .expect("InvoiceBuilder totals failed");
        invoice
    }
}

/// A cash payment made on `date` by a random cashier
pub fn cash_payment(amount: Money, date: NaiveDate) -> PaymentRequest {
    PaymentRequest::new(amount, date, PaymentMethod::Cash).with_cashier(PartyFixtures::cashier())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::{DueStatus, InvoiceStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn test_due_builder_defaults() {
        let due = DueBuilder::new().build();
        assert_eq!(due.net_payable_amount, MoneyFixtures::lkr_1000());
        assert_eq!(due.status, DueStatus::Pending);
        assert_eq!(due.academic_year.as_deref(), Some("2024"));
    }

    #[test]
    fn test_due_builder_with_payment() {
        let due = DueBuilder::new()
            .scholarship(dec!(10), None)
            .paid(MoneyFixtures::lkr(dec!(300)))
            .build();
        assert_eq!(due.net_payable_amount, MoneyFixtures::lkr(dec!(900)));
        assert_eq!(due.amount_outstanding, MoneyFixtures::lkr(dec!(600)));
        assert_eq!(due.status, DueStatus::Partial);
    }

    #[test]
    fn test_invoice_builder_totals() {
        let customer = PartyFixtures::customer_id();
        let invoice = InvoiceBuilder::new(customer)
            .line("Library fee", MoneyFixtures::lkr_500())
            .due(DueBuilder::new().customer(customer).build())
            .build();
        assert_eq!(invoice.line_items.len(), 2);
        assert_eq!(invoice.subtotal, MoneyFixtures::lkr(dec!(1500)));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }
}
