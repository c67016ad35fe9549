//! In-memory ledger store
//!
//! Implements both ledger ports over plain maps behind one `RwLock`, for
//! tests, simulations and embedding. Versioned writes check the stored
//! version under the write lock, dues and invoices alike, so concurrent
//! writers behave exactly as they do against PostgreSQL: one wins, the rest
//! get a conflict.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use core_kernel::{CustomerId, DomainPort, DueId, InvoiceId, PortError};
use domain_ledger::{
    DueLedgerEntry, DueLedgerPort, DueQuery, Invoice, InvoicePort, LatePaymentPenalty,
    PaymentHistory,
};

#[derive(Debug, Default)]
struct LedgerTables {
    dues: HashMap<DueId, DueLedgerEntry>,
    payments: Vec<PaymentHistory>,
    penalties: Vec<LatePaymentPenalty>,
    invoices: HashMap<InvoiceId, Invoice>,
}

/// Ledger store held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<LedgerTables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored dues, deleted ones included
    pub fn due_count(&self) -> usize {
        self.read().map(|t| t.dues.len()).unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerTables>, PortError> {
        self.tables
            .read()
            .map_err(|_| PortError::internal("ledger store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerTables>, PortError> {
        self.tables
            .write()
            .map_err(|_| PortError::internal("ledger store lock poisoned"))
    }
}

impl LedgerTables {
    /// Replaces the stored entry if its version still matches
    fn compare_and_swap(&mut self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, PortError> {
        let stored = self
            .dues
            .get_mut(&entry.id)
            .ok_or_else(|| PortError::not_found("DueLedgerEntry", entry.id))?;

        if stored.version != entry.version {
            return Err(PortError::conflict(
                "DueLedgerEntry",
                entry.id,
                entry.version,
                stored.version,
            ));
        }

        let mut next = entry.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    fn ensure_new_receipt(&self, payment: &PaymentHistory) -> Result<(), PortError> {
        if self
            .payments
            .iter()
            .any(|p| p.id == payment.id || p.receipt_number == payment.receipt_number)
        {
            return Err(PortError::Duplicate {
                message: format!("receipt {} already recorded", payment.receipt_number),
            });
        }
        Ok(())
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl DueLedgerPort for InMemoryLedgerStore {
    async fn insert_due(&self, entry: DueLedgerEntry) -> Result<DueLedgerEntry, PortError> {
        let mut tables = self.write()?;
        if tables.dues.contains_key(&entry.id) {
            return Err(PortError::Duplicate {
                message: format!("due {} already exists", entry.id),
            });
        }
        let mut stored = entry;
        stored.version = 1;
        tables.dues.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_due(&self, id: DueId) -> Result<DueLedgerEntry, PortError> {
        self.read()?
            .dues
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("DueLedgerEntry", id))
    }

    async fn update_due(&self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, PortError> {
        self.write()?.compare_and_swap(entry)
    }

    async fn query_dues(&self, query: &DueQuery) -> Result<Vec<DueLedgerEntry>, PortError> {
        let tables = self.read()?;
        let mut found: Vec<DueLedgerEntry> = tables
            .dues
            .values()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    async fn commit_payment(
        &self,
        entry: &DueLedgerEntry,
        payment: &PaymentHistory,
    ) -> Result<DueLedgerEntry, PortError> {
        let mut tables = self.write()?;
        tables.ensure_new_receipt(payment)?;
        let stored = tables.compare_and_swap(entry)?;
        tables.payments.push(payment.clone());
        Ok(stored)
    }

    async fn commit_penalty(
        &self,
        entry: &DueLedgerEntry,
        penalty: Option<&LatePaymentPenalty>,
    ) -> Result<DueLedgerEntry, PortError> {
        let mut tables = self.write()?;
        let stored = tables.compare_and_swap(entry)?;
        if let Some(record) = penalty {
            tables.penalties.push(record.clone());
        }
        Ok(stored)
    }

    async fn payments_for_due(&self, id: DueId) -> Result<Vec<PaymentHistory>, PortError> {
        Ok(self
            .read()?
            .payments
            .iter()
            .filter(|p| p.due_id == id)
            .cloned()
            .collect())
    }

    async fn penalties_for_due(&self, id: DueId) -> Result<Vec<LatePaymentPenalty>, PortError> {
        Ok(self
            .read()?
            .penalties
            .iter()
            .filter(|p| p.due_id == id)
            .cloned()
            .collect())
    }

    async fn payments_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentHistory>, PortError> {
        Ok(self
            .read()?
            .payments
            .iter()
            .filter(|p| p.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InvoicePort for InMemoryLedgerStore {
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, PortError> {
        let mut tables = self.write()?;
        let number_taken = tables
            .invoices
            .values()
            .any(|i| i.id != invoice.id && i.invoice_number == invoice.invoice_number);
        if number_taken {
            return Err(PortError::Duplicate {
                message: format!("invoice number {} already used", invoice.invoice_number),
            });
        }

        let stored_version = tables.invoices.get(&invoice.id).map(|i| i.version);
        match stored_version {
            None if invoice.version != 0 => {
                return Err(PortError::not_found("Invoice", invoice.id));
            }
            Some(actual) if actual != invoice.version => {
                return Err(PortError::conflict("Invoice", invoice.id, invoice.version, actual));
            }
            _ => {}
        }

        let mut next = invoice.clone();
        next.version += 1;
        tables.invoices.insert(next.id, next.clone());
        Ok(next)
    }

    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.read()?
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Invoice", id))
    }

    async fn invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>, PortError> {
        let tables = self.read()?;
        let mut found: Vec<Invoice> = tables
            .invoices
            .values()
            .filter(|i| i.customer_id == customer_id && i.audit.is_active())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.invoice_date.cmp(&a.invoice_date).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}
