//! Daily late penalty sweep
//!
//! The scheduler sleeps until the configured local time, runs one sweep and
//! goes back to sleep. A shutdown request stops the loop between sweeps; a
//! sweep already running is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use core_kernel::Timezone;
use domain_ledger::{LatePenaltyEngine, LedgerError, SweepSummary};

/// Next instant after `now` at which the local clock reads `at`
pub fn next_run_at(now: DateTime<Utc>, timezone: Timezone, at: NaiveTime) -> DateTime<Utc> {
    let local_today = timezone.local_date(now);
    let today_run = resolve_local(timezone, local_today.and_time(at));
    if today_run > now {
        return today_run;
    }
    let tomorrow = local_today + chrono::Days::new(1);
    resolve_local(timezone, tomorrow.and_time(at))
}

// Local times skipped by a DST jump run an hour later.
fn resolve_local(timezone: Timezone, local: NaiveDateTime) -> DateTime<Utc> {
    timezone
        .0
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| {
            timezone
                .0
                .from_local_datetime(&(local + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}

/// Runs the penalty sweep once a day
pub struct SweepScheduler {
    engine: Arc<LatePenaltyEngine>,
    timezone: Timezone,
    at: NaiveTime,
    run_on_start: bool,
    shutdown: Arc<Notify>,
}

impl SweepScheduler {
    pub fn new(engine: Arc<LatePenaltyEngine>, timezone: Timezone, at: NaiveTime) -> Self {
        Self {
            engine,
            timezone,
            at,
            run_on_start: false,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Handle used to stop the loop; `notify_one` may be called before or
    /// during a sweep
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Spawns the loop onto the runtime
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            timezone = %self.timezone.0,
            at = %self.at,
            run_on_start = self.run_on_start,
            "Sweep scheduler started"
        );

        if self.run_on_start {
            self.sweep().await;
        }

        loop {
            let now = Utc::now();
            let next = next_run_at(now, self.timezone, self.at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, "Next penalty sweep scheduled");

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Sweep scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    self.sweep().await;
                }
            }
        }
    }

    async fn sweep(&self) -> Option<SweepSummary> {
        match self.engine.run_sweep_today().await {
            Ok(summary) => {
                if summary.failed > 0 {
                    warn!(failed = summary.failed, "Penalty sweep finished with failures");
                }
                Some(summary)
            }
            Err(LedgerError::SweepInProgress) => {
                warn!("Skipping scheduled sweep, previous one still running");
                None
            }
            Err(e) => {
                error!(error = %e, "Scheduled penalty sweep failed");
                None
            }
        }
    }
}
