//! In-memory ledger store tests
//!
//! Exercise the versioned-write contract both stores share.

use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Currency, CustomerId, DueId, Money, PaymentId, PenaltyId, PortError, Rate};
use domain_ledger::{
    DueLedgerEntry, DueLedgerPort, DueQuery, DueStatus, Invoice, InvoicePort, LatePaymentPenalty,
    NewDue, PaymentHistory, PaymentMethod, PaymentStatus,
};
use infra_db::InMemoryLedgerStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn lkr(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount, Currency::LKR)
}

fn open_due(customer_id: CustomerId, due_date: NaiveDate) -> DueLedgerEntry {
    let new = NewDue::new(customer_id, "TUITION", lkr(dec!(1000)), due_date);
    DueLedgerEntry::open(new, date(2024, 1, 1), Utc::now()).unwrap()
}

fn payment_for(entry: &DueLedgerEntry, amount: Money, receipt: &str) -> PaymentHistory {
    PaymentHistory {
        id: PaymentId::new_v7(),
        due_id: entry.id,
        customer_id: entry.customer_id,
        enrollment_id: entry.enrollment_id,
        amount,
        currency: amount.currency(),
        payment_date: date(2024, 1, 10),
        method: PaymentMethod::Cash,
        reference: None,
        receipt_number: receipt.to_string(),
        cashier_name: Some("front-desk".to_string()),
        status: PaymentStatus::Completed,
        remarks: None,
        recorded_at: Utc::now(),
    }
}

// ============================================================================
// Versioned writes
// ============================================================================

mod versioning_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_sets_version_one() {
        let store = InMemoryLedgerStore::new();
        let stored = store.insert_due(open_due(CustomerId::new(), date(2024, 2, 1))).await.unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(store.get_due(stored.id).await.unwrap(), stored);
        assert_eq!(store.due_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let entry = open_due(CustomerId::new(), date(2024, 2, 1));
        store.insert_due(entry.clone()).await.unwrap();

        let err = store.insert_due(entry).await.unwrap_err();
        assert!(matches!(err, PortError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_and_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        let stored = store.insert_due(open_due(CustomerId::new(), date(2024, 2, 1))).await.unwrap();

        let mut first = stored.clone();
        first.remarks = Some("first".into());
        let updated = store.update_due(&first).await.unwrap();
        assert_eq!(updated.version, 2);

        let mut stale = stored;
        stale.remarks = Some("stale".into());
        let err = store.update_due(&stale).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict { expected: 1, actual: 2, .. }));

        let current = store.get_due(updated.id).await.unwrap();
        assert_eq!(current.remarks.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_missing_due_is_not_found() {
        let store = InMemoryLedgerStore::new();
        assert!(store.get_due(DueId::new()).await.unwrap_err().is_not_found());

        let ghost = open_due(CustomerId::new(), date(2024, 2, 1));
        assert!(store.update_due(&ghost).await.unwrap_err().is_not_found());
    }
}

// ============================================================================
// Combined commits
// ============================================================================

mod commit_tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_payment_stores_entry_and_history() {
        let store = InMemoryLedgerStore::new();
        let mut entry = store.insert_due(open_due(CustomerId::new(), date(2024, 2, 1))).await.unwrap();

        entry.record_payment(lkr(dec!(400)), date(2024, 1, 10), Utc::now()).unwrap();
        let payment = payment_for(&entry, lkr(dec!(400)), "REC-0001-1-000001");
        let stored = store.commit_payment(&entry, &payment).await.unwrap();

        assert_eq!(stored.version, 2);
        assert_eq!(stored.status, DueStatus::Partial);
        assert_eq!(store.payments_for_due(entry.id).await.unwrap(), vec![payment.clone()]);
        assert_eq!(
            store.payments_for_customer(entry.customer_id).await.unwrap(),
            vec![payment]
        );
    }

    #[tokio::test]
    async fn test_conflicting_payment_leaves_no_history() {
        let store = InMemoryLedgerStore::new();
        let stored = store.insert_due(open_due(CustomerId::new(), date(2024, 2, 1))).await.unwrap();
        store.update_due(&stored).await.unwrap();

        let mut stale = stored;
        stale.record_payment(lkr(dec!(100)), date(2024, 1, 10), Utc::now()).unwrap();
        let payment = payment_for(&stale, lkr(dec!(100)), "REC-0001-1-000002");

        assert!(store.commit_payment(&stale, &payment).await.unwrap_err().is_conflict());
        assert!(store.payments_for_due(stale.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reused_receipt_number_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let mut entry = store.insert_due(open_due(CustomerId::new(), date(2024, 2, 1))).await.unwrap();

        entry.record_payment(lkr(dec!(100)), date(2024, 1, 10), Utc::now()).unwrap();
        let first = payment_for(&entry, lkr(dec!(100)), "REC-0001-1-000003");
        let mut entry = store.commit_payment(&entry, &first).await.unwrap();

        entry.record_payment(lkr(dec!(100)), date(2024, 1, 11), Utc::now()).unwrap();
        let second = payment_for(&entry, lkr(dec!(100)), "REC-0001-1-000003");
        let err = store.commit_payment(&entry, &second).await.unwrap_err();

        assert!(matches!(err, PortError::Duplicate { .. }));
        assert_eq!(store.get_due(entry.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_commit_penalty_with_and_without_record() {
        let store = InMemoryLedgerStore::new();
        let mut entry = store.insert_due(open_due(CustomerId::new(), date(2024, 1, 1))).await.unwrap();

        entry
            .apply_late_penalty(Rate::new(dec!(0.01)), lkr(dec!(10)), Utc::now())
            .unwrap();
        let record = LatePaymentPenalty {
            id: PenaltyId::new_v7(),
            due_id: entry.id,
            customer_id: entry.customer_id,
            penalty_amount: lkr(dec!(10)),
            delta: lkr(dec!(10)),
            penalty_date: date(2024, 1, 15),
            days_overdue: 14,
            weeks_charged: 1,
            penalty_rate: Rate::new(dec!(0.01)),
            is_paid: false,
            remarks: None,
            recorded_at: Utc::now(),
        };
        let entry = store.commit_penalty(&entry, Some(&record)).await.unwrap();
        let entry = store.commit_penalty(&entry, None).await.unwrap();

        assert_eq!(entry.version, 3);
        assert_eq!(store.penalties_for_due(entry.id).await.unwrap(), vec![record]);
    }
}

// ============================================================================
// Queries
// ============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_query_orders_and_paginates() {
        let store = InMemoryLedgerStore::new();
        let customer = CustomerId::new();
        for day in [20, 5, 12] {
            store.insert_due(open_due(customer, date(2024, 3, day))).await.unwrap();
        }
        store.insert_due(open_due(CustomerId::new(), date(2024, 3, 1))).await.unwrap();

        let all = store.query_dues(&DueQuery::for_customer(customer)).await.unwrap();
        let dates: Vec<_> = all.iter().map(|d| d.due_date).collect();
        assert_eq!(dates, vec![date(2024, 3, 5), date(2024, 3, 12), date(2024, 3, 20)]);

        let page = store
            .query_dues(&DueQuery::for_customer(customer).paginate(1, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].due_date, date(2024, 3, 12));
    }

    #[tokio::test]
    async fn test_deleted_entries_are_hidden() {
        let store = InMemoryLedgerStore::new();
        let customer = CustomerId::new();
        let mut entry = store.insert_due(open_due(customer, date(2024, 3, 1))).await.unwrap();
        entry.soft_delete(Utc::now(), Some("admin"));
        store.update_due(&entry).await.unwrap();

        assert!(store.query_dues(&DueQuery::for_customer(customer)).await.unwrap().is_empty());
        assert!(store.get_due(entry.id).await.unwrap().audit.is_deleted());
    }

    #[tokio::test]
    async fn test_invoices_newest_first() {
        let store = InMemoryLedgerStore::new();
        let customer = CustomerId::new();
        let older = Invoice::new("INV-1", customer, date(2024, 1, 1), date(2024, 1, 31), Currency::LKR);
        let newer = Invoice::new("INV-2", customer, date(2024, 2, 1), date(2024, 2, 29), Currency::LKR);
        store.save_invoice(&older).await.unwrap();
        store.save_invoice(&newer).await.unwrap();

        let found = store.invoices_for_customer(customer).await.unwrap();
        let numbers: Vec<_> = found.iter().map(|i| i.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-2", "INV-1"]);

        let clash = Invoice::new("INV-1", customer, date(2024, 3, 1), date(2024, 3, 31), Currency::LKR);
        assert!(matches!(
            store.save_invoice(&clash).await.unwrap_err(),
            PortError::Duplicate { .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_invoice_copy_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let mut draft = Invoice::new("INV-7", CustomerId::new(), date(2024, 1, 1), date(2024, 1, 31), Currency::LKR);
        draft
            .add_line_item(domain_ledger::InvoiceLineItem::new("Tuition", lkr(dec!(1000))))
            .unwrap();
        draft.issue(date(2024, 1, 1), Utc::now()).unwrap();
        let stored = store.save_invoice(&draft).await.unwrap();
        assert_eq!(stored.version, 1);

        let mut first = store.get_invoice(stored.id).await.unwrap();
        let mut second = store.get_invoice(stored.id).await.unwrap();
        first.record_payment(lkr(dec!(300)), date(2024, 1, 5), Utc::now()).unwrap();
        second.record_payment(lkr(dec!(200)), date(2024, 1, 5), Utc::now()).unwrap();

        assert_eq!(store.save_invoice(&first).await.unwrap().version, 2);
        assert!(matches!(
            store.save_invoice(&second).await.unwrap_err(),
            PortError::Conflict { expected: 1, actual: 2, .. }
        ));
        assert_eq!(store.get_invoice(stored.id).await.unwrap().amount_paid, lkr(dec!(300)));

        // the unsaved draft still has version 0, which is not an insert any more
        assert!(store.save_invoice(&draft).await.unwrap_err().is_conflict());
    }
}
