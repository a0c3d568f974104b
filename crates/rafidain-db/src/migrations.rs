//! # Database Migrations
//!
//! Embedded SQL migrations for the Rafidain ledger.
//!
//! The `sqlx::migrate!()` macro embeds every SQL file from
//! `migrations/sqlite/` into the binary at compile time; no runtime file
//! access is needed. Applied migrations are tracked in the
//! `_sqlx_migrations` table, so running them repeatedly is safe.
//!
//! ## Adding New Migrations
//! 1. Create `migrations/sqlite/NNN_description.sql` with the next number
//! 2. Write idempotent SQL (`IF NOT EXISTS` where possible)
//! 3. NEVER modify an existing migration - always add a new one

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations, in filename order, each in its
/// own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied");
    Ok(())
}

/// Returns (total embedded, applied) migration counts, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
