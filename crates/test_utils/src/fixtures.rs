//! Pre-built Test Fixtures
//!
//! Ready-to-use ledger data. Dates are fixed so scenarios read the same on
//! every run: the academic year starts on 1 January 2024 and the first
//! installment falls due on 1 February 2024.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{Currency, CustomerId, FixedClock, Money, ProgramId};
use domain_ledger::{DueLedgerEntry, Enrollment, NewDue, PenaltyPolicy};

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn lkr(amount: Decimal) -> Money {
        Money::new(amount, Currency::LKR)
    }

    /// A single monthly installment
    pub fn lkr_1000() -> Money {
        Self::lkr(dec!(1000.00))
    }

    pub fn lkr_500() -> Money {
        Self::lkr(dec!(500.00))
    }

    /// A full programme fee
    pub fn lkr_program_fee() -> Money {
        Self::lkr(dec!(100000.00))
    }

    pub fn lkr_zero() -> Money {
        Money::zero(Currency::LKR)
    }

    /// For currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }
}

/// Fixture for calendar data
pub struct DateFixtures;

impl DateFixtures {
    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid fixture date")
    }

    /// First day of the academic year
    pub fn term_start() -> NaiveDate {
        Self::date(2024, 1, 1)
    }

    /// Due date of the first installment
    pub fn first_due_date() -> NaiveDate {
        Self::date(2024, 2, 1)
    }

    /// Noon UTC on the first day of the year
    pub fn recorded_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// A clock pinned to the start of the academic year
    pub fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Self::term_start()))
    }
}

/// Fixture for people and reference strings
pub struct PartyFixtures;

impl PartyFixtures {
    pub fn customer_id() -> CustomerId {
        CustomerId::new()
    }

    pub fn program_id() -> ProgramId {
        ProgramId::new()
    }

    /// A random cashier name
    pub fn cashier() -> String {
        Name().fake()
    }

    pub fn enrollment_reference() -> &'static str {
        "ENR-2024-0001"
    }
}

/// Fixture for ledger records
pub struct LedgerFixtures;

impl LedgerFixtures {
    /// Programme fee of 100,000 with a 25% scholarship
    pub fn scholarship_enrollment(customer_id: CustomerId) -> Enrollment {
        Enrollment::new(
            customer_id,
            PartyFixtures::program_id(),
            PartyFixtures::enrollment_reference(),
            DateFixtures::term_start(),
            MoneyFixtures::lkr_program_fee(),
            dec!(25),
        )
        .expect("valid fixture enrollment")
    }

    /// A plain tuition due, opened at the start of term
    pub fn tuition_due(customer_id: CustomerId, amount: Money, due_date: NaiveDate) -> DueLedgerEntry {
        let new = NewDue::new(customer_id, "TUITION", amount, due_date)
            .with_academic_period("2024", "S1");
        DueLedgerEntry::open(new, DateFixtures::term_start(), DateFixtures::recorded_at())
            .expect("valid fixture due")
    }

    /// The 1,000 installment due on 1 February 2024
    pub fn standard_due(customer_id: CustomerId) -> DueLedgerEntry {
        Self::tuition_due(customer_id, MoneyFixtures::lkr_1000(), DateFixtures::first_due_date())
    }

    /// Seven days of grace, one percent per week
    pub fn default_policy() -> PenaltyPolicy {
        PenaltyPolicy::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_ledger::DueStatus;

    #[test]
    fn test_standard_due_is_pending() {
        let due = LedgerFixtures::standard_due(PartyFixtures::customer_id());
        assert_eq!(due.status, DueStatus::Pending);
        assert_eq!(due.amount_outstanding, MoneyFixtures::lkr_1000());
    }

    #[test]
    fn test_scholarship_enrollment_split() {
        let enrollment = LedgerFixtures::scholarship_enrollment(PartyFixtures::customer_id());
        assert_eq!(enrollment.scholarship_amount(), MoneyFixtures::lkr(dec!(25000)));
        assert_eq!(enrollment.net_payable_amount(), MoneyFixtures::lkr(dec!(75000)));
    }

    #[test]
    fn test_cashier_names_are_not_empty() {
        assert!(!PartyFixtures::cashier().is_empty());
    }
}
