//! # Exchange-Rate Oracle
//!
//! The single current IQD-per-USD conversion rate, cached with a short
//! time-to-live.
//!
//! ## Cache Discipline
//! ```text
//! current(false) ──► cache fresh? ──yes──► cached row (byte-identical)
//!                        │no
//!                        ▼
//!                newest row by effective_at ──► cache {value, fetched_at}
//!
//! update(rate)  ──► INSERT new row ──► invalidate cache synchronously
//!                   (the series is append-only; rows are never updated)
//! ```
//!
//! The cache is an explicit `{value, fetched_at}` pair owned by the
//! oracle instance, not a process-wide global. `Database` keeps one
//! oracle and clones it out so every handle shares the same cache.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use rafidain_core::ExchangeRate;

use crate::error::{LedgerError, LedgerResult};

#[derive(Debug, Clone)]
struct CachedRate {
    rate: ExchangeRate,
    fetched_at: Instant,
}

/// Serves and updates the current exchange rate.
#[derive(Debug, Clone)]
pub struct ExchangeRateOracle {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    cache: Arc<Mutex<Option<CachedRate>>>,
    ttl: Duration,
}

impl ExchangeRateOracle {
    pub fn new(pool: SqlitePool, write_lock: Arc<Mutex<()>>, ttl: Duration) -> Self {
        ExchangeRateOracle {
            pool,
            write_lock,
            cache: Arc::new(Mutex::new(None)),
            ttl,
        }
    }

    /// Returns the current rate: the most recent row by effective date.
    ///
    /// Served from cache while the TTL holds, unless `bypass_cache` is
    /// set. An empty series is a referential error; the ledger cannot
    /// convert costs without a rate on file.
    pub async fn current(&self, bypass_cache: bool) -> LedgerResult<ExchangeRate> {
        let mut cache = self.cache.lock().await;

        if !bypass_cache {
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.rate.clone());
                }
            }
        }

        let rate = self.fetch_latest().await?;
        debug!(rate = rate.rate, "Exchange rate refreshed from store");

        *cache = Some(CachedRate {
            rate: rate.clone(),
            fetched_at: Instant::now(),
        });

        Ok(rate)
    }

    /// Appends a new rate row and invalidates the cache synchronously.
    /// The next read repopulates from the store.
    pub async fn update(
        &self,
        rate: f64,
        effective_at: Option<DateTime<Utc>>,
        note: Option<&str>,
    ) -> LedgerResult<ExchangeRate> {
        let _guard = self.write_lock.lock().await;

        let row = ExchangeRate {
            id: Uuid::new_v4().to_string(),
            rate,
            effective_at: effective_at.unwrap_or_else(Utc::now),
            note: note.map(str::to_string),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO exchange_rates (id, rate, effective_at, note, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&row.id)
        .bind(row.rate)
        .bind(row.effective_at)
        .bind(&row.note)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        info!(rate, "Exchange rate updated");

        *self.cache.lock().await = None;

        Ok(row)
    }

    async fn fetch_latest(&self) -> LedgerResult<ExchangeRate> {
        let rate = sqlx::query_as::<_, ExchangeRate>(
            r#"
            SELECT id, rate, effective_at, note, created_at
            FROM exchange_rates
            ORDER BY effective_at DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        rate.ok_or_else(|| LedgerError::not_found("ExchangeRate", "current"))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_db;

    #[tokio::test]
    async fn reads_within_ttl_hit_the_cache() {
        let db = test_db().await;
        let oracle = db.exchange_rates();

        oracle.update(1460.0, None, None).await.unwrap();

        let first = oracle.current(false).await.unwrap();
        let second = oracle.current(false).await.unwrap();
        assert_eq!(first, second);

        // A row sneaked in behind the cache is invisible until TTL/bypass
        sqlx::query(
            "INSERT INTO exchange_rates (id, rate, effective_at, note, created_at)
             VALUES ('r2', 1500.0, '2099-01-01T00:00:00Z', NULL, '2099-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let cached = oracle.current(false).await.unwrap();
        assert_eq!(cached.rate, 1460.0);

        let bypassed = oracle.current(true).await.unwrap();
        assert_eq!(bypassed.rate, 1500.0);
    }

    #[tokio::test]
    async fn update_invalidates_inside_the_cache_window() {
        let db = test_db().await;
        let oracle = db.exchange_rates();

        oracle.update(1460.0, None, None).await.unwrap();
        assert_eq!(oracle.current(false).await.unwrap().rate, 1460.0);

        oracle.update(1475.0, None, None).await.unwrap();
        // Immediately visible despite the TTL
        assert_eq!(oracle.current(false).await.unwrap().rate, 1475.0);
    }

    #[tokio::test]
    async fn newest_effective_date_wins() {
        let db = test_db().await;
        let oracle = db.exchange_rates();

        let old = "2024-01-01T00:00:00Z".parse().unwrap();
        let new = "2025-06-01T00:00:00Z".parse().unwrap();
        oracle.update(1400.0, Some(new), None).await.unwrap();
        oracle.update(1350.0, Some(old), None).await.unwrap();

        assert_eq!(oracle.current(true).await.unwrap().rate, 1400.0);
    }

    #[tokio::test]
    async fn empty_series_is_an_error() {
        let db = test_db().await;
        let err = db.exchange_rates().current(false).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }
}
