//! Late payment penalties
//!
//! Once a due is past its grace period, it accrues a penalty for every
//! whole week it stays unpaid:
//!
//! ```text
//! days_overdue = today - due_date
//! weeks        = (days_overdue - grace_period_days) / 7      (whole weeks)
//! rate         = weekly_penalty_rate * weeks
//! penalty      = round(amount_outstanding * rate)
//! ```
//!
//! The figure is recomputed from scratch on every sweep and replaces the
//! previous one, so running the sweep twice on the same day changes nothing.
//! Each change of the figure is appended to the due's accrual history as a
//! [`LatePaymentPenalty`] record.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use core_kernel::{Clock, CoreError, CustomerId, DueId, Money, PenaltyId, Rate};

use crate::due::{DueLedgerEntry, DueStatus};
use crate::error::LedgerError;
use crate::payment::DEFAULT_MAX_ATTEMPTS;
use crate::ports::{DueLedgerPort, DueQuery};

/// Grace period and weekly rate for late penalties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyPolicy {
    /// Days after the due date with no penalty
    pub grace_period_days: u32,
    /// Fraction of the outstanding amount charged per whole week, e.g. 0.01
    pub weekly_penalty_rate: Decimal,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
            weekly_penalty_rate: dec!(0.01),
        }
    }
}

impl PenaltyPolicy {
    pub fn new(grace_period_days: u32, weekly_penalty_rate: Decimal) -> Result<Self, CoreError> {
        let policy = Self {
            grace_period_days,
            weekly_penalty_rate,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.weekly_penalty_rate < Decimal::ZERO || self.weekly_penalty_rate > Decimal::ONE {
            return Err(CoreError::configuration(format!(
                "weekly penalty rate must be between 0 and 1, got {}",
                self.weekly_penalty_rate
            )));
        }
        Ok(())
    }
}

/// Outcome of assessing one due against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyAssessment {
    /// Not overdue, nothing outstanding, deleted, or in a status that does
    /// not accrue penalties
    NotEligible,
    /// Overdue but not yet a full week past the grace period
    WithinGrace { days_overdue: i64 },
    /// Penalty figure as of the assessment date
    Accrue {
        days_overdue: i64,
        weeks: i64,
        rate: Rate,
        amount: Money,
    },
}

/// Works out the penalty a due should carry on `today`
pub fn assess_penalty(
    policy: &PenaltyPolicy,
    entry: &DueLedgerEntry,
    today: NaiveDate,
) -> PenaltyAssessment {
    if !entry.is_active() || !entry.status.accrues_penalty() || !entry.is_overdue(today) {
        return PenaltyAssessment::NotEligible;
    }

    let days_overdue = entry.days_overdue(today);
    let grace = i64::from(policy.grace_period_days);
    if days_overdue <= grace {
        return PenaltyAssessment::WithinGrace { days_overdue };
    }

    let weeks = (days_overdue - grace) / 7;
    if weeks <= 0 {
        return PenaltyAssessment::WithinGrace { days_overdue };
    }

    let rate = Rate::new(policy.weekly_penalty_rate).times(weeks);
    PenaltyAssessment::Accrue {
        days_overdue,
        weeks,
        rate,
        amount: rate.apply(&entry.amount_outstanding),
    }
}

/// One change of a due's penalty figure
///
/// Append-only; the latest record's `penalty_amount` equals the figure on
/// the due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatePaymentPenalty {
    pub id: PenaltyId,
    pub due_id: DueId,
    pub customer_id: CustomerId,
    /// Penalty total as of `penalty_date`
    pub penalty_amount: Money,
    /// Change against the previous figure
    pub delta: Money,
    pub penalty_date: NaiveDate,
    pub days_overdue: i64,
    pub weeks_charged: i64,
    pub penalty_rate: Rate,
    pub is_paid: bool,
    pub remarks: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Candidates returned by the store
    pub scanned: usize,
    /// Entries whose penalty was written
    pub processed: usize,
    /// Entries already carrying today's figure
    pub unchanged: usize,
    /// Entries within grace, short of a full week, or no longer eligible
    pub skipped: usize,
    /// Entries that could not be processed
    pub failed: usize,
}

enum EntryOutcome {
    Processed,
    Unchanged,
    Skipped,
}

/// Periodic recomputation of late penalties
///
/// Sweeps are mutually exclusive: a call made while another sweep is
/// running returns [`LedgerError::SweepInProgress`] without touching data.
/// A failure on one entry is logged and counted; the sweep moves on.
pub struct LatePenaltyEngine {
    store: Arc<dyn DueLedgerPort>,
    clock: Arc<dyn Clock>,
    policy: PenaltyPolicy,
    max_attempts: u32,
    running: Mutex<()>,
}

impl LatePenaltyEngine {
    pub fn new(store: Arc<dyn DueLedgerPort>, clock: Arc<dyn Clock>, policy: PenaltyPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            running: Mutex::new(()),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn policy(&self) -> &PenaltyPolicy {
        &self.policy
    }

    /// Runs a sweep for the clock's current business date
    pub async fn run_sweep_today(&self) -> Result<SweepSummary, LedgerError> {
        self.run_sweep(self.clock.today()).await
    }

    /// Recomputes penalties of every overdue due as of `today`
    pub async fn run_sweep(&self, today: NaiveDate) -> Result<SweepSummary, LedgerError> {
        let _guard = self.running.try_lock().map_err(|_| {
            warn!(%today, "Penalty sweep requested while another is running");
            LedgerError::SweepInProgress
        })?;

        info!(%today, grace_days = self.policy.grace_period_days, "Starting late penalty sweep");

        let candidates = self
            .store
            .query_dues(&DueQuery::penalty_candidates(today))
            .await?;

        let mut summary = SweepSummary {
            scanned: candidates.len(),
            ..Default::default()
        };

        for entry in candidates {
            let due_id = entry.id;
            match self.process_entry(entry, today).await {
                Ok(EntryOutcome::Processed) => summary.processed += 1,
                Ok(EntryOutcome::Unchanged) => summary.unchanged += 1,
                Ok(EntryOutcome::Skipped) => summary.skipped += 1,
                Err(e) => {
                    error!(due_id = %due_id, error = %e, "Failed to apply late penalty");
                    summary.failed += 1;
                }
            }
        }

        info!(
            %today,
            scanned = summary.scanned,
            processed = summary.processed,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            "Late penalty sweep completed"
        );
        Ok(summary)
    }

    async fn process_entry(
        &self,
        mut entry: DueLedgerEntry,
        today: NaiveDate,
    ) -> Result<EntryOutcome, LedgerError> {
        let mut attempt = 1;
        loop {
            let (days_overdue, weeks, rate, amount) = match assess_penalty(&self.policy, &entry, today) {
                PenaltyAssessment::Accrue {
                    days_overdue,
                    weeks,
                    rate,
                    amount,
                } => (days_overdue, weeks, rate, amount),
                PenaltyAssessment::NotEligible | PenaltyAssessment::WithinGrace { .. } => {
                    return Ok(EntryOutcome::Skipped)
                }
            };

            let previous = entry.late_penalty_amount;
            if previous == amount
                && entry.late_penalty_rate == rate
                && entry.status == DueStatus::Overdue
            {
                return Ok(EntryOutcome::Unchanged);
            }

            let now = self.clock.now();
            entry.apply_late_penalty(rate, amount, now)?;

            let delta = amount.checked_sub(&previous)?;
            let record = (!delta.is_zero()).then(|| LatePaymentPenalty {
                id: PenaltyId::new_v7(),
                due_id: entry.id,
                customer_id: entry.customer_id,
                penalty_amount: amount,
                delta,
                penalty_date: today,
                days_overdue,
                weeks_charged: weeks,
                penalty_rate: rate,
                is_paid: false,
                remarks: None,
                recorded_at: now,
            });

            match self.store.commit_penalty(&entry, record.as_ref()).await {
                Ok(_) => {
                    debug!(
                        due_id = %entry.id,
                        penalty = %amount,
                        weeks,
                        "Applied late penalty"
                    );
                    return Ok(EntryOutcome::Processed);
                }
                Err(e) if e.is_conflict() && attempt < self.max_attempts => {
                    warn!(due_id = %entry.id, attempt, "Due changed during sweep, re-reading");
                    attempt += 1;
                    entry = self.store.get_due(entry.id).await?;
                }
                Err(e) if e.is_conflict() => {
                    return Err(LedgerError::ConcurrencyConflict {
                        entity: "DueLedgerEntry".to_string(),
                        id: entry.id.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
