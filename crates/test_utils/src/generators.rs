//! Property-Based Test Generators
//!
//! Proptest strategies producing ledger inputs that respect domain limits.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use core_kernel::{Currency, Money};

use crate::builders::DueBuilder;
use crate::fixtures::DateFixtures;

/// Currencies the ledger deals in
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::LKR),
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::JPY),
    ]
}

/// Positive amounts in minor units, up to ten million
pub fn positive_amount_minor_strategy() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

pub fn lkr_money_strategy() -> impl Strategy<Value = Money> {
    positive_amount_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::LKR))
}

pub fn positive_money_strategy() -> impl Strategy<Value = Money> {
    (positive_amount_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Scholarship percentages from 0 to 100 with two decimals
pub fn scholarship_percentage_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=10_000u32).prop_map(|n| Decimal::new(i64::from(n), 2))
}

/// Weekly penalty rates from 0 to 5%
pub fn weekly_rate_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=500u32).prop_map(|n| Decimal::new(i64::from(n), 4))
}

/// Dates within two years after the start of term
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0u64..730u64).prop_map(|offset| DateFixtures::term_start() + Days::new(offset))
}

/// A due amount split into a series of positive payments
///
/// The payments may add up to more than the amount.
pub fn payment_series_strategy() -> impl Strategy<Value = (Money, Vec<Money>)> {
    (1i64..10_000_000i64, prop::collection::vec(1i64..5_000_000i64, 1..8)).prop_map(
        |(amount, payments)| {
            (
                Money::from_minor(amount, Currency::LKR),
                payments
                    .into_iter()
                    .map(|p| Money::from_minor(p, Currency::LKR))
                    .collect(),
            )
        },
    )
}

/// Builders for LKR dues with a random amount, scholarship and due date
pub fn due_builder_strategy() -> impl Strategy<Value = DueBuilder> {
    (lkr_money_strategy(), scholarship_percentage_strategy(), date_strategy()).prop_map(
        |(amount, percentage, due_date)| {
            DueBuilder::new()
                .amount(amount)
                .scholarship(percentage, None)
                .due_on(due_date)
        },
    )
}
