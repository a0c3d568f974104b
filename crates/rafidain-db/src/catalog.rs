//! # Catalog Repositories
//!
//! Branches and variants: the referents every ledger operation hangs off.
//!
//! Variant identity is immutable once created. The cost fields
//! (`avg_cost_usd`, `last_purchase_cost_usd`) are owned by the costing
//! engine and are not writable through this repository.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use rafidain_core::{Branch, NewVariant, Variant};

use crate::error::LedgerResult;

const VARIANT_COLUMNS: &str = "id, product_name, sku, size, color, default_price_iqd, \
     avg_cost_usd, last_purchase_cost_usd, created_at, updated_at";

/// Repository for branch records.
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: SqlitePool,
}

impl BranchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BranchRepository { pool }
    }

    /// Inserts a branch with the given id (ids come from the caller so
    /// fixtures and imports can use stable names).
    pub async fn insert(&self, id: &str, name: &str) -> LedgerResult<Branch> {
        debug!(id, name, "Inserting branch");

        let branch = Branch {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO branches (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&branch.id)
            .bind(&branch.name)
            .bind(branch.created_at)
            .execute(&self.pool)
            .await?;

        Ok(branch)
    }

    pub async fn get(&self, id: &str) -> LedgerResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, name, created_at FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }
}

/// Repository for variant records.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Inserts a variant. Cost fields start at zero; only receiving
    /// inventory moves them.
    pub async fn insert(&self, new: &NewVariant) -> LedgerResult<Variant> {
        self.insert_with_id(&Uuid::new_v4().to_string(), new).await
    }

    /// Insert with a caller-chosen id (fixtures, bulk import).
    pub async fn insert_with_id(&self, id: &str, new: &NewVariant) -> LedgerResult<Variant> {
        debug!(id, sku = %new.sku, "Inserting variant");

        let now = Utc::now();
        let variant = Variant {
            id: id.to_string(),
            product_name: new.product_name.clone(),
            sku: new.sku.clone(),
            size: new.size.clone(),
            color: new.color.clone(),
            default_price_iqd: new.default_price_iqd,
            avg_cost_usd: 0.0,
            last_purchase_cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO variants (id, product_name, sku, size, color, default_price_iqd,
                                  avg_cost_usd, last_purchase_cost_usd, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_name)
        .bind(&variant.sku)
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(variant.default_price_iqd)
        .bind(variant.avg_cost_usd)
        .bind(variant.last_purchase_cost_usd)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(variant)
    }

    pub async fn get(&self, id: &str) -> LedgerResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    pub async fn get_by_sku(&self, sku: &str) -> LedgerResult<Option<Variant>> {
        let variant = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE sku = ?1"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    pub async fn list(&self, limit: u32) -> LedgerResult<Vec<Variant>> {
        let variants = sqlx::query_as::<_, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants ORDER BY product_name, sku LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DbError, LedgerError};
    use crate::testutil::test_db;

    fn shirt(sku: &str) -> NewVariant {
        NewVariant {
            product_name: "Oxford Shirt".to_string(),
            sku: sku.to_string(),
            size: Some("L".to_string()),
            color: Some("white".to_string()),
            default_price_iqd: 25_000,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch_roundtrip() {
        let db = test_db().await;

        let created = db.variants().insert(&shirt("SHIRT-L-WHT")).await.unwrap();
        let fetched = db.variants().get(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.sku, "SHIRT-L-WHT");
        assert_eq!(fetched.avg_cost_usd, 0.0);

        let by_sku = db.variants().get_by_sku("SHIRT-L-WHT").await.unwrap();
        assert!(by_sku.is_some());
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected() {
        let db = test_db().await;

        db.variants().insert(&shirt("DUP-1")).await.unwrap();
        let err = db.variants().insert(&shirt("DUP-1")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Db(DbError::UniqueViolation { .. })
        ));
    }
}
