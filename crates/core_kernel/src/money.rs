//! Money types with precise decimal arithmetic
//!
//! This module provides a type-safe representation of monetary values
//! using rust_decimal for precise calculations without floating-point errors.
//!
//! Every `Money` value is held at its currency's display scale. Any operation
//! that produces more digits (percentages, rate multiplication, division) is
//! rounded half-up, i.e. midpoints move away from zero.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub, Mul, Neg};
use thiserror::Error;

/// Scale used for exchange rates
pub const EXCHANGE_RATE_SCALE: u32 = 6;

/// Rounds a decimal half-up (midpoint away from zero) to `dp` places
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    LKR,
    USD,
    EUR,
    GBP,
    JPY,
    INR,
    AUD,
    CAD,
    SGD,
    AED,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::LKR => "Rs",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::INR => "₹",
            Currency::AUD => "A$",
            Currency::CAD => "C$",
            Currency::SGD => "S$",
            Currency::AED => "AED",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::LKR => "LKR",
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::INR => "INR",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SGD => "SGD",
            Currency::AED => "AED",
        }
    }

    /// Parses an ISO 4217 code (case-insensitive)
    pub fn from_code(code: &str) -> Option<Self> {
        let currency = match code.to_ascii_uppercase().as_str() {
            "LKR" => Currency::LKR,
            "USD" => Currency::USD,
            "EUR" => Currency::EUR,
            "GBP" => Currency::GBP,
            "JPY" => Currency::JPY,
            "INR" => Currency::INR,
            "AUD" => Currency::AUD,
            "CAD" => Currency::CAD,
            "SGD" => Currency::SGD,
            "AED" => Currency::AED,
            _ => return None,
        };
        Some(currency)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("No exchange rate for {0} effective on {1}")]
    MissingRate(String, String),
}

/// A monetary amount with associated currency
///
/// The amount is always stored at the currency's scale, rounded half-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value, rounding half-up to the currency scale
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: round_half_up(amount, currency.decimal_places()),
            currency,
        }
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self {
            amount: self.amount.abs(),
            currency: self.currency,
        }
    }

    /// Returns the larger of this amount and zero
    pub fn max_zero(&self) -> Self {
        if self.is_negative() {
            Self::zero(self.currency)
        } else {
            *self
        }
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount + other.amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Multiplies by a scalar (e.g., for rate calculations)
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self::new(self.amount * factor, self.currency)
    }

    /// Divides by a scalar
    pub fn divide(&self, divisor: Decimal) -> Result<Self, MoneyError> {
        if divisor.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }
        Ok(Self::new(self.amount / divisor, self.currency))
    }

    /// Returns `percentage` percent of this amount, e.g. 20 => one fifth
    pub fn percentage(&self, percentage: Decimal) -> Self {
        Self::new(self.amount * percentage / dec!(100), self.currency)
    }

    /// Sums a sequence of amounts in the given currency
    pub fn sum<'a>(
        currency: Currency,
        amounts: impl IntoIterator<Item = &'a Money>,
    ) -> Result<Money, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl PartialOrd for Money {
    /// Amounts in different currencies are not comparable
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{} {:.dp$}",
            self.currency.symbol(),
            self.amount,
            dp = dp as usize
        )
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other)
            .expect("Currency mismatch in Money::add")
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other)
            .expect("Currency mismatch in Money::sub")
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

/// Represents a percentage rate (e.g., penalty rate, scholarship rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.05 for 5%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.05 for 5%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// A zero rate
    pub fn zero() -> Self {
        Self { value: Decimal::ZERO }
    }

    /// Creates a rate from a percentage (e.g., 5.0 for 5%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Returns this rate repeated `periods` times (simple, not compounded)
    pub fn times(&self, periods: i64) -> Self {
        Self {
            value: self.value * Decimal::from(periods),
        }
    }

    /// Returns true if the rate is zero
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Applies this rate to a money amount
    pub fn apply(&self, money: &Money) -> Money {
        money.multiply(self.value)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage().round_dp(4).normalize())
    }
}

/// Rate of a currency against a base currency, valid over a date range
///
/// `1 unit of currency = rate units of base`. Rates are held at six
/// decimal places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub currency: Currency,
    pub base: Currency,
    rate: Decimal,
    pub effective_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl ExchangeRate {
    /// Creates a rate effective from `effective_date` until superseded
    pub fn new(
        currency: Currency,
        base: Currency,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Result<Self, MoneyError> {
        if rate <= Decimal::ZERO {
            return Err(MoneyError::InvalidAmount(format!(
                "exchange rate must be positive, got {}",
                rate
            )));
        }
        Ok(Self {
            currency,
            base,
            rate: round_half_up(rate, EXCHANGE_RATE_SCALE),
            effective_date,
            end_date: None,
        })
    }

    /// Closes the rate; it no longer applies from `end_date` onwards
    pub fn ending(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// True if the rate applies on `date`
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        date >= self.effective_date && self.end_date.map_or(true, |end| date < end)
    }

    /// Converts an amount in `currency` into the base currency
    pub fn convert(&self, money: &Money) -> Result<Money, MoneyError> {
        if money.currency() == self.base {
            return Ok(*money);
        }
        if money.currency() != self.currency {
            return Err(MoneyError::CurrencyMismatch(
                money.currency().to_string(),
                self.currency.to_string(),
            ));
        }
        Ok(Money::new(money.amount() * self.rate, self.base))
    }

    /// Picks the rate for `currency` that applies on `date`
    pub fn find_effective<'a>(
        rates: &'a [ExchangeRate],
        currency: Currency,
        date: NaiveDate,
    ) -> Result<&'a ExchangeRate, MoneyError> {
        rates
            .iter()
            .filter(|r| r.currency == currency && r.is_effective_on(date))
            .max_by_key(|r| r.effective_date)
            .ok_or_else(|| MoneyError::MissingRate(currency.to_string(), date.to_string()))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn percentage_split_is_exact(
            minor in 0i64..10_000_000_000i64,
            pct_bp in 0u32..=10_000u32
        ) {
            let fee = Money::from_minor(minor, Currency::LKR);
            let pct = Decimal::new(pct_bp as i64, 2);
            let share = fee.percentage(pct);
            let rest = fee - share;

            prop_assert_eq!(share + rest, fee);
            prop_assert!(share <= fee);
        }

        #[test]
        fn money_arithmetic_is_associative(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
            c in -1_000_000i64..1_000_000i64
        ) {
            let ma = Money::from_minor(a, Currency::USD);
            let mb = Money::from_minor(b, Currency::USD);
            let mc = Money::from_minor(c, Currency::USD);

            prop_assert_eq!((ma + mb) + mc, ma + (mb + mc));
        }
    }
}
