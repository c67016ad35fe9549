//! PostgreSQL test containers
//!
//! Each [`TestDatabase`] is a throwaway PostgreSQL container migrated with
//! the same embedded migrations the worker runs at start-up. Tests that use
//! it need Docker and are marked `#[ignore]`.

use std::time::Duration;

use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerAdapter};
use sqlx::PgPool;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

const IMAGE: &str = "postgres";
const TAG: &str = "16-alpine";
const USER: &str = "ledger";
const PASSWORD: &str = "ledger";
const DATABASE: &str = "dues_ledger_test";
const READY_LINE: &str = "database system is ready to accept connections";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection URL for the test database on `host:port`
pub fn test_database_url(host: &str, port: u16) -> String {
    format!("postgres://{USER}:{PASSWORD}@{host}:{port}/{DATABASE}")
}

/// A migrated PostgreSQL container; dropped with the value
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    url: String,
    pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and applies the ledger migrations
    pub async fn start() -> Result<Self, BoxError> {
        let container = GenericImage::new(IMAGE, TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_LINE))
            .with_env_var("POSTGRES_USER", USER)
            .with_env_var("POSTGRES_PASSWORD", PASSWORD)
            .with_env_var("POSTGRES_DB", DATABASE)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;
        let url = test_database_url(&host, port);

        let config = DatabaseConfig::new(url.clone())
            .max_connections(5)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(30));
        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            url,
            pool,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A ledger adapter over this database
    pub fn ledger(&self) -> PostgresLedgerAdapter {
        PostgresLedgerAdapter::new(self.pool.clone())
    }

    /// Empties every ledger table, keeping the schema
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        sqlx::query(
            "TRUNCATE invoice_line_items, invoices, late_payment_penalties, \
             payment_history, due_ledger_entries CASCADE",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Starts a database owned by a single test
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::start().await
}
