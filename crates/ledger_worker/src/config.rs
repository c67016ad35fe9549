//! Worker configuration
//!
//! Values come from `LEDGER_*` environment variables (a `.env` file is read
//! by the binary first). Nested keys use a double underscore, e.g.
//! `LEDGER_PENALTY__WEEKLY_PENALTY_RATE=0.015`. Anything unset keeps its
//! default.

use chrono::NaiveTime;
use serde::Deserialize;
use std::time::Duration;

use core_kernel::Timezone;
use domain_ledger::PenaltyPolicy;
use infra_db::DatabaseConfig;

use crate::error::WorkerError;

const ENV_PREFIX: &str = "LEDGER";

/// Worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Pool size
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connect_timeout_secs: u64,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// IANA zone that decides the business date
    pub timezone: String,
    /// Local time of the daily sweep, `HH:MM`
    pub sweep_time: String,
    /// Sweep once right after start-up
    pub run_on_start: bool,
    pub penalty: PenaltyPolicy,
    /// Attempts per version-guarded write before giving up
    pub max_write_attempts: u32,
    /// Distinguishes receipt and invoice numbers issued by this process
    pub node_id: u16,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/dues_ledger".to_string(),
            max_connections: 10,
            connect_timeout_secs: 30,
            log_level: "info".to_string(),
            timezone: "UTC".to_string(),
            sweep_time: "01:00".to_string(),
            run_on_start: false,
            penalty: PenaltyPolicy::default(),
            max_write_attempts: 3,
            node_id: 0,
        }
    }
}

impl LedgerConfig {
    /// Loads and validates configuration from the process environment
    ///
    /// `DATABASE_URL` is honoured when `LEDGER_DATABASE_URL` is not set.
    pub fn from_env() -> Result<Self, WorkerError> {
        let mut builder = config::Config::builder();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_default("database_url", url)?;
        }
        let config: Self = builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, WorkerError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        let config: Self = config::Config::builder()
            .add_source(Self::environment().source(Some(vars)))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Checks every value that can only be verified after loading
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.database_url.trim().is_empty() {
            return Err(WorkerError::config("database_url must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(WorkerError::config("max_connections must be at least 1"));
        }
        if self.max_write_attempts == 0 {
            return Err(WorkerError::config("max_write_attempts must be at least 1"));
        }
        self.timezone()?;
        self.sweep_time()?;
        self.penalty
            .validate()
            .map_err(|e| WorkerError::config(e.to_string()))
    }

    pub fn timezone(&self) -> Result<Timezone, WorkerError> {
        Timezone::parse(&self.timezone).map_err(|e| WorkerError::config(e.to_string()))
    }

    pub fn sweep_time(&self) -> Result<NaiveTime, WorkerError> {
        NaiveTime::parse_from_str(&self.sweep_time, "%H:%M").map_err(|_| {
            WorkerError::config(format!(
                "sweep_time must be HH:MM, got {:?}",
                self.sweep_time
            ))
        })
    }

    /// Pool settings for `infra_db::create_pool`
    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = LedgerConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.penalty, PenaltyPolicy::default());
        assert_eq!(config.sweep_time().unwrap(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(config.max_write_attempts, 3);
    }

    #[test]
    fn test_environment_overrides() {
        let config = LedgerConfig::from_vars([
            ("LEDGER_DATABASE_URL", "postgres://db/ledger"),
            ("LEDGER_TIMEZONE", "Asia/Colombo"),
            ("LEDGER_SWEEP_TIME", "02:30"),
            ("LEDGER_RUN_ON_START", "true"),
            ("LEDGER_PENALTY__GRACE_PERIOD_DAYS", "14"),
            ("LEDGER_PENALTY__WEEKLY_PENALTY_RATE", "0.015"),
            ("LEDGER_NODE_ID", "3"),
        ])
        .unwrap();

        assert_eq!(config.database_url, "postgres://db/ledger");
        assert_eq!(config.timezone().unwrap(), Timezone::parse("Asia/Colombo").unwrap());
        assert!(config.run_on_start);
        assert_eq!(config.penalty.grace_period_days, 14);
        assert_eq!(config.penalty.weekly_penalty_rate, dec!(0.015));
        assert_eq!(config.node_id, 3);
        assert_eq!(config.database().url, "postgres://db/ledger");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("LEDGER_TIMEZONE", "Mars/Olympus"),
            ("LEDGER_SWEEP_TIME", "25:00"),
            ("LEDGER_PENALTY__WEEKLY_PENALTY_RATE", "1.5"),
            ("LEDGER_MAX_WRITE_ATTEMPTS", "0"),
        ] {
            let result = LedgerConfig::from_vars([(key, value)]);
            assert!(
                matches!(result, Err(WorkerError::Config(_))),
                "{} = {} should be rejected",
                key,
                value
            );
        }
    }
}
