//! # Connection Management
//!
//! Connection creation and configuration for the single-file SQLite store.
//!
//! ## The Single-Writer Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                   One connection, one writer                        │
//! │                                                                     │
//! │  Ledger op A ──┐                                                    │
//! │  Ledger op B ──┼──► write_lock (tokio Mutex) ──► BEGIN..COMMIT ──┐  │
//! │  Ledger op C ──┘        (queued, in order)                       │  │
//! │                                                                  ▼  │
//! │                                             single SQLite connection│
//! │                                                                     │
//! │  Because each database call suspends the caller, two logical        │
//! │  transactions could otherwise interleave their statements on the    │
//! │  shared connection. The write lock guarantees that a logical        │
//! │  transaction's statements are never interleaved with another's.     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers that need no transaction go straight through the pool and may
//! run between transactions without restriction.
//!
//! ## WAL Mode
//! WAL journaling is enabled for better crash recovery and so that
//! readers never block the writer.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use rafidain_core::EXCHANGE_RATE_TTL_SECS;

use crate::catalog::{BranchRepository, VariantRepository};
use crate::customer::CustomerRepository;
use crate::error::{DbError, DbResult};
use crate::ledger::purchase::PurchaseOrderProcessor;
use crate::ledger::returns::ReturnProcessor;
use crate::ledger::sale::SaleProcessor;
use crate::migrations;
use crate::rate::ExchangeRateOracle;
use crate::stock::StockRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/ledger.db")
///     .connect_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file. Created if missing.
    pub database_path: PathBuf,

    /// Connections in the pool. Default 1: the ledger is written through
    /// exactly one connection; raising this only widens read concurrency
    /// and must never bypass the write lock.
    pub max_connections: u32,

    /// Connection acquire timeout.
    pub connect_timeout: Duration,

    /// Whether to run migrations on connect. Default: true.
    pub run_migrations: bool,

    /// Time-to-live for the cached exchange rate.
    pub rate_cache_ttl: Duration,
}

impl DbConfig {
    /// Creates a configuration with the given database path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 1,
            connect_timeout: Duration::from_secs(30),
            run_migrations: true,
            rate_cache_ttl: Duration::from_secs(EXCHANGE_RATE_TTL_SECS),
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connection acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether migrations run on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Sets the exchange-rate cache TTL.
    pub fn rate_cache_ttl(mut self, ttl: Duration) -> Self {
        self.rate_cache_ttl = ttl;
        self
    }

    /// In-memory database configuration (for tests).
    ///
    /// In-memory SQLite lives and dies with its one connection, so the
    /// pool is pinned to a single connection that is never closed.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            run_migrations: true,
            rate_cache_ttl: Duration::from_secs(EXCHANGE_RATE_TTL_SECS),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle.
///
/// Owns the connection pool, the global write lock that serializes
/// logical transactions, and the shared exchange-rate oracle. Hands out
/// repositories and processors; all of them are cheap clones over the
/// same pool and lock.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    /// Serializes logical transactions. Every mutating ledger operation
    /// holds this for its full BEGIN..COMMIT span.
    write_lock: Arc<Mutex<()>>,
    /// Shared oracle so the rate cache survives across accessor calls.
    rates: ExchangeRateOracle,
}

impl Database {
    /// Creates the pool, applies pragmas and runs migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing ledger database"
        );

        let connect_url = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // WAL: readers never block the writer
            .journal_mode(SqliteJournalMode::Wal)
            // NORMAL: safe from corruption, may lose the last tx on crash
            .synchronous(SqliteSynchronous::Normal)
            // SQLite ships with FKs off; the schema depends on them
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            // Never reap the connection: for in-memory databases it IS
            // the database
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(max_connections = config.max_connections, "Pool created");

        let write_lock = Arc::new(Mutex::new(()));
        let rates = ExchangeRateOracle::new(pool.clone(), write_lock.clone(), config.rate_cache_ttl);
        let db = Database {
            pool,
            write_lock,
            rates,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Raw pool access for queries not covered by the repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The stock ledger: deltas, audit trail, consistency check.
    pub fn stock(&self) -> StockRepository {
        StockRepository::new(self.pool.clone(), self.write_lock.clone())
    }

    /// Branch catalog.
    pub fn branches(&self) -> BranchRepository {
        BranchRepository::new(self.pool.clone())
    }

    /// Variant catalog.
    pub fn variants(&self) -> VariantRepository {
        VariantRepository::new(self.pool.clone())
    }

    /// Customer records and lifetime aggregates.
    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository::new(self.pool.clone())
    }

    /// The exchange-rate oracle (shared cache).
    pub fn exchange_rates(&self) -> ExchangeRateOracle {
        self.rates.clone()
    }

    /// The sale transaction processor.
    pub fn sales(&self) -> SaleProcessor {
        SaleProcessor::new(
            self.pool.clone(),
            self.write_lock.clone(),
            self.rates.clone(),
        )
    }

    /// The return/exchange processor.
    pub fn returns(&self) -> ReturnProcessor {
        ReturnProcessor::new(
            self.pool.clone(),
            self.write_lock.clone(),
            self.rates.clone(),
        )
    }

    /// The purchase-order processor.
    pub fn purchase_orders(&self) -> PurchaseOrderProcessor {
        PurchaseOrderProcessor::new(self.pool.clone(), self.write_lock.clone())
    }

    /// Closes the pool. All further operations fail.
    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    /// Checks that the database answers queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_is_healthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.run_migrations().await.unwrap();
        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[test]
    fn config_builder() {
        let config = DbConfig::new("/tmp/ledger.db")
            .connect_timeout(Duration::from_secs(10))
            .rate_cache_ttl(Duration::from_secs(60));
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.rate_cache_ttl, Duration::from_secs(60));
    }
}
