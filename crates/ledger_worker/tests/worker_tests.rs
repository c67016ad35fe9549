//! Worker wiring tests against the in-memory store

use std::sync::Arc;

use chrono::NaiveTime;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Timezone};
use domain_ledger::{DueLedgerPort, DueStatus};
use infra_db::InMemoryLedgerStore;
use ledger_worker::{config::LedgerConfig, LedgerServices, SweepScheduler};
use test_utils::{assert_money_eq, cash_payment, DateFixtures, DueBuilder, MoneyFixtures, PartyFixtures};

fn services(config: &LedgerConfig, today: chrono::NaiveDate) -> (Arc<InMemoryLedgerStore>, LedgerServices) {
    let store = Arc::new(InMemoryLedgerStore::new());
    let clock = Arc::new(core_kernel::FixedClock::new(today));
    let services = LedgerServices::new(config, store.clone(), clock);
    (store, services)
}

#[tokio::test]
async fn test_services_share_store_and_numbering() {
    let config = LedgerConfig::from_vars([("LEDGER_NODE_ID", "42")]).unwrap();
    let today = DateFixtures::date(2024, 1, 10);
    let (store, services) = services(&config, today);
    let customer = PartyFixtures::customer_id();
    let due = store
        .insert_due(DueBuilder::new().customer(customer).build())
        .await
        .unwrap();

    let receipt = services
        .payments
        .apply_payment(due.id, cash_payment(MoneyFixtures::lkr(dec!(400)), today))
        .await
        .unwrap();
    assert!(receipt.receipt_number.starts_with("REC-0042-"));

    let invoice = services
        .invoices
        .bill_outstanding(customer, Currency::LKR, DateFixtures::date(2024, 2, 15))
        .await
        .unwrap();
    assert!(invoice.invoice_number.starts_with("INV-0042-"));
    assert_money_eq(&invoice.total_amount, &MoneyFixtures::lkr(dec!(600)));

    let outstanding = services
        .reports
        .total_outstanding(customer, Currency::LKR)
        .await
        .unwrap();
    assert_money_eq(&outstanding, &MoneyFixtures::lkr(dec!(600)));
}

#[tokio::test]
async fn test_configured_policy_drives_the_sweep() {
    let config = LedgerConfig::from_vars([
        ("LEDGER_PENALTY__GRACE_PERIOD_DAYS", "0"),
        ("LEDGER_PENALTY__WEEKLY_PENALTY_RATE", "0.02"),
    ])
    .unwrap();
    let today = DateFixtures::date(2024, 1, 8);
    let (store, services) = services(&config, today);
    let due = store
        .insert_due(DueBuilder::new().due_on(DateFixtures::date(2024, 1, 1)).build())
        .await
        .unwrap();

    let summary = services.penalties.run_sweep_today().await.unwrap();

    assert_eq!(summary.processed, 1);
    let stored = store.get_due(due.id).await.unwrap();
    assert_money_eq(&stored.late_penalty_amount, &MoneyFixtures::lkr(dec!(20.00)));
}

#[tokio::test]
async fn test_scheduler_runs_on_start_and_stops_on_request() {
    let config = LedgerConfig::default();
    let today = DateFixtures::date(2024, 1, 20);
    let (store, services) = services(&config, today);
    let due = store
        .insert_due(
            DueBuilder::new()
                .amount(MoneyFixtures::lkr(dec!(50000)))
                .due_on(DateFixtures::date(2024, 1, 1))
                .build(),
        )
        .await
        .unwrap();

    let scheduler = SweepScheduler::new(
        services.penalties.clone(),
        Timezone::default(),
        NaiveTime::from_hms_opt(1, 0, 0).unwrap(),
    )
    .run_on_start(true);
    // stop requested up front: the start-up sweep still runs, then the loop exits
    scheduler.shutdown_handle().notify_one();
    scheduler.start().await.unwrap();

    let stored = store.get_due(due.id).await.unwrap();
    assert_eq!(stored.status, DueStatus::Overdue);
    assert_money_eq(&stored.late_penalty_amount, &MoneyFixtures::lkr(dec!(500.00)));
}
