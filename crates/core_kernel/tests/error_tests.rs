//! Tests for core_kernel error types

use core_kernel::error::CoreError;
use core_kernel::money::MoneyError;
use core_kernel::temporal::{TemporalError, Timezone};

#[test]
fn test_core_error_validation() {
    let error = CoreError::validation("Invalid input");

    match error {
        CoreError::Validation(msg) => assert_eq!(msg, "Invalid input"),
        _ => panic!("Expected Validation error"),
    }
}

#[test]
fn test_core_error_from_money_error() {
    let money_error = MoneyError::CurrencyMismatch("LKR".to_string(), "USD".to_string());
    let core_error: CoreError = money_error.into();

    assert!(matches!(core_error, CoreError::Money(_)));
    assert!(core_error.to_string().contains("LKR"));
}

#[test]
fn test_core_error_from_temporal_error() {
    let temporal_error = Timezone::parse("Nowhere/Special").unwrap_err();
    let core_error: CoreError = temporal_error.into();

    assert!(matches!(
        core_error,
        CoreError::Temporal(TemporalError::UnknownTimezone(_))
    ));
}

#[test]
fn test_core_error_configuration() {
    let error = CoreError::configuration("grace period must not be negative");

    match error {
        CoreError::Configuration(msg) => assert!(msg.contains("grace period")),
        _ => panic!("Expected Configuration error"),
    }
}
