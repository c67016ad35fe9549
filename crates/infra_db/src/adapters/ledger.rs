//! PostgreSQL Ledger Adapter
//!
//! Implements [`DueLedgerPort`] and [`InvoicePort`] using the due and
//! invoice repositories.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, DatabaseConfig, PostgresLedgerAdapter};
//! use domain_ledger::DueLedgerPort;
//! use std::sync::Arc;
//!
//! let pool = create_pool(DatabaseConfig::new(url)).await?;
//! let store: Arc<dyn DueLedgerPort> = Arc::new(PostgresLedgerAdapter::new(pool));
//! let due = store.get_due(due_id).await?;
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{CustomerId, DomainPort, DueId, InvoiceId, PortError};
use domain_ledger::{
    DueLedgerEntry, DueLedgerPort, DueQuery, Invoice, InvoicePort, LatePaymentPenalty,
    PaymentHistory,
};

use crate::error::DatabaseError;
use crate::repositories::{DueRepository, InvoiceRepository};

/// PostgreSQL-backed implementation of the ledger ports
///
/// Database errors are translated to `PortError` variants:
/// - `DatabaseError::NotFound` -> `PortError::NotFound`
/// - `DatabaseError::VersionConflict` -> `PortError::Conflict`
/// - Other errors -> see `From<DatabaseError> for PortError`
#[derive(Debug, Clone)]
pub struct PostgresLedgerAdapter {
    dues: DueRepository,
    invoices: InvoiceRepository,
    pool: PgPool,
}

impl PostgresLedgerAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self {
            dues: DueRepository::new(pool.clone()),
            invoices: InvoiceRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the due repository for queries the port does not expose
    pub fn dues(&self) -> &DueRepository {
        &self.dues
    }

    /// Checks database connectivity with a trivial query
    pub async fn ping(&self) -> Result<(), PortError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| db_to_port_error(e.into()))
    }
}

// Mark as a domain port
impl DomainPort for PostgresLedgerAdapter {}

fn db_to_port_error(error: DatabaseError) -> PortError {
    error.into()
}

#[async_trait]
impl DueLedgerPort for PostgresLedgerAdapter {
    #[instrument(skip(self, entry), fields(due_id = %entry.id))]
    async fn insert_due(&self, entry: DueLedgerEntry) -> Result<DueLedgerEntry, PortError> {
        debug!("Inserting due");
        self.dues.insert(&entry).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(due_id = %id))]
    async fn get_due(&self, id: DueId) -> Result<DueLedgerEntry, PortError> {
        debug!("Fetching due by ID");
        self.dues.get(id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self, entry), fields(due_id = %entry.id, version = entry.version))]
    async fn update_due(&self, entry: &DueLedgerEntry) -> Result<DueLedgerEntry, PortError> {
        debug!("Updating due");
        self.dues.update(entry).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self))]
    async fn query_dues(&self, query: &DueQuery) -> Result<Vec<DueLedgerEntry>, PortError> {
        debug!("Finding dues with query: {:?}", query);
        self.dues.find(query).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self, entry, payment), fields(due_id = %entry.id, receipt = %payment.receipt_number))]
    async fn commit_payment(
        &self,
        entry: &DueLedgerEntry,
        payment: &PaymentHistory,
    ) -> Result<DueLedgerEntry, PortError> {
        debug!("Committing payment");
        self.dues
            .commit_payment(entry, payment)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self, entry, penalty), fields(due_id = %entry.id, recorded = penalty.is_some()))]
    async fn commit_penalty(
        &self,
        entry: &DueLedgerEntry,
        penalty: Option<&LatePaymentPenalty>,
    ) -> Result<DueLedgerEntry, PortError> {
        debug!("Committing penalty accrual");
        self.dues
            .commit_penalty(entry, penalty)
            .await
            .map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(due_id = %id))]
    async fn payments_for_due(&self, id: DueId) -> Result<Vec<PaymentHistory>, PortError> {
        self.dues.payments_for_due(id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(due_id = %id))]
    async fn penalties_for_due(&self, id: DueId) -> Result<Vec<LatePaymentPenalty>, PortError> {
        self.dues.penalties_for_due(id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn payments_for_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<PaymentHistory>, PortError> {
        self.dues
            .payments_for_customer(customer_id)
            .await
            .map_err(db_to_port_error)
    }
}

#[async_trait]
impl InvoicePort for PostgresLedgerAdapter {
    #[instrument(skip(self, invoice), fields(invoice_number = %invoice.invoice_number))]
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Invoice, PortError> {
        debug!("Saving invoice");
        self.invoices.save(invoice).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(invoice_id = %id))]
    async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PortError> {
        self.invoices.get(id).await.map_err(db_to_port_error)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    async fn invoices_for_customer(&self, customer_id: CustomerId) -> Result<Vec<Invoice>, PortError> {
        self.invoices
            .find_by_customer(customer_id)
            .await
            .map_err(db_to_port_error)
    }
}
