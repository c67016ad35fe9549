//! Ledger Worker
//!
//! Process-level wiring for the dues ledger: configuration loading, the
//! service set built over one store, and the scheduler that runs the late
//! penalty sweep every day.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_worker::{config::LedgerConfig, LedgerServices};
//!
//! let config = LedgerConfig::from_env()?;
//! let services = LedgerServices::new(&config, store, clock);
//! services.penalties.run_sweep_today().await?;
//! ```

pub mod config;
pub mod error;
pub mod scheduler;

use std::sync::Arc;

use core_kernel::Clock;
use domain_ledger::{
    DueLedgerPort, InvoiceAggregator, InvoicePort, LatePenaltyEngine, LedgerReports,
    NumberGenerator, PaymentApplier,
};

use crate::config::LedgerConfig;

pub use error::WorkerError;
pub use scheduler::{next_run_at, SweepScheduler};

/// Every ledger service, sharing one store and one clock
pub struct LedgerServices {
    pub payments: PaymentApplier,
    pub penalties: Arc<LatePenaltyEngine>,
    pub invoices: InvoiceAggregator,
    pub reports: LedgerReports,
}

impl LedgerServices {
    /// Builds the services over a store that holds dues and invoices
    pub fn new<S>(config: &LedgerConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> Self
    where
        S: DueLedgerPort + InvoicePort,
    {
        let payments = PaymentApplier::new(store.clone(), clock.clone())
            .with_receipts(Arc::new(NumberGenerator::receipts(config.node_id)))
            .with_max_attempts(config.max_write_attempts);
        let penalties = LatePenaltyEngine::new(store.clone(), clock.clone(), config.penalty)
            .with_max_attempts(config.max_write_attempts);
        let invoices = InvoiceAggregator::new(
            store.clone(),
            store.clone(),
            clock,
            Arc::new(NumberGenerator::invoices(config.node_id)),
        )
        .with_max_attempts(config.max_write_attempts);

        Self {
            payments,
            penalties: Arc::new(penalties),
            invoices,
            reports: LedgerReports::new(store),
        }
    }
}
