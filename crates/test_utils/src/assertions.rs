//! Custom Test Assertions
//!
//! Assertion helpers for ledger types that give more meaningful failure
//! messages than `assert_eq!` on whole records.

use rust_decimal::Decimal;

use core_kernel::Money;
use domain_ledger::{DueLedgerEntry, DueStatus, Invoice};

/// Asserts that two Money values are equal, currency included
pub fn assert_money_eq(actual: &Money, expected: &Money) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );
    assert_eq!(
        actual.amount(),
        expected.amount(),
        "Money mismatch: actual={}, expected={}",
        actual,
        expected
    );
}

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(money.is_zero(), "Expected zero money, got {}", money);
}

/// Asserts that money values sum to a total
pub fn assert_money_sum_equals(parts: &[Money], total: &Money) {
    let sum = parts.iter().fold(Money::zero(total.currency()), |acc, m| {
        acc.checked_add(m).expect("Currency mismatch in sum")
    });

    assert_eq!(
        sum.amount(),
        total.amount(),
        "Sum of parts ({}) doesn't equal total ({})",
        sum.amount(),
        total.amount()
    );
}

/// Asserts that every derived figure of a due agrees with its inputs
///
/// Checks the net payable, the outstanding amount, the total with charges
/// and that the status matches what was paid.
pub fn assert_due_invariants(entry: &DueLedgerEntry) {
    let base = if entry.gross_amount.is_positive() {
        entry.gross_amount
    } else {
        entry.original_rate
    };
    assert_money_eq(
        &entry.scholarship_amount,
        &entry.original_rate.percentage(entry.scholarship_percentage),
    );
    assert_money_eq(
        &entry.net_payable_amount,
        &(base - entry.scholarship_amount - entry.discount_amount),
    );
    assert_money_eq(
        &entry.amount_outstanding,
        &(entry.net_payable_amount - entry.amount_paid),
    );
    assert_money_eq(
        &entry.total_amount_with_charges,
        &(entry.net_payable_amount + entry.service_charge_amount + entry.late_penalty_amount),
    );

    match entry.status {
        DueStatus::Paid => {
            assert!(
                entry.amount_paid >= entry.net_payable_amount,
                "Due {} is PAID with {} of {} paid",
                entry.id,
                entry.amount_paid,
                entry.net_payable_amount
            );
            assert!(entry.paid_date.is_some(), "Due {} is PAID without a paid date", entry.id);
        }
        DueStatus::Partial => assert!(
            entry.amount_paid.is_positive() && entry.amount_paid < entry.net_payable_amount,
            "Due {} is PARTIAL with {} of {} paid",
            entry.id,
            entry.amount_paid,
            entry.net_payable_amount
        ),
        DueStatus::Pending => assert!(
            entry.amount_paid.is_zero(),
            "Due {} is PENDING with {} paid",
            entry.id,
            entry.amount_paid
        ),
        DueStatus::Overdue | DueStatus::Cancelled => {}
    }
}

/// Asserts that an invoice's totals add up
pub fn assert_invoice_totals(invoice: &Invoice) {
    let lines: Vec<Money> = invoice.line_items.iter().map(|l| l.line_total).collect();
    assert_money_sum_equals(&lines, &invoice.subtotal);
    assert_money_eq(
        &invoice.total_amount,
        &(invoice.subtotal - invoice.discount_amount + invoice.tax_amount),
    );
    assert_money_eq(&invoice.amount_due, &(invoice.total_amount - invoice.amount_paid));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::DueBuilder;
    use crate::fixtures::MoneyFixtures;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_approx_eq_within_tolerance() {
        assert_money_approx_eq(
            &MoneyFixtures::lkr(dec!(100.00)),
            &MoneyFixtures::lkr(dec!(100.01)),
            dec!(0.01),
        );
    }

    #[test]
    #[should_panic(expected = "Currency mismatch")]
    fn test_money_eq_rejects_other_currency() {
        assert_money_eq(&MoneyFixtures::lkr(dec!(100)), &MoneyFixtures::usd_100());
    }

    #[test]
    fn test_built_dues_satisfy_invariants() {
        assert_due_invariants(&DueBuilder::new().build());
        assert_due_invariants(
            &DueBuilder::new()
                .scholarship(dec!(50), None)
                .service_charge(MoneyFixtures::lkr(dec!(25)))
                .paid(MoneyFixtures::lkr(dec!(500)))
                .build(),
        );
    }
}
