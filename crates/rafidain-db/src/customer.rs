//! # Customer Aggregates
//!
//! Denormalized lifetime figures on the customer row: visit count, total
//! spend, loyalty points, last visit. Every attributed sale bumps them;
//! deleting a sale reverts them, clamped so nothing goes below zero.
//!
//! The sale and adjustment tables remain the source of truth; these
//! aggregates are performance snapshots, not bookkeeping.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use rafidain_core::money::loyalty_points_for;
use rafidain_core::{Customer, NewCustomer};

use crate::error::{LedgerError, LedgerResult};

/// Applies an attributed sale to the customer's lifetime aggregates.
///
/// Visits +1, spend +amount, points +amount/1000, last visit = now.
pub async fn record_purchase(
    conn: &mut SqliteConnection,
    customer_id: &str,
    amount_iqd: i64,
) -> LedgerResult<()> {
    debug!(customer_id, amount_iqd, "Recording customer purchase");

    let points = loyalty_points_for(amount_iqd);
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET total_visits = total_visits + 1,
            total_spent_iqd = total_spent_iqd + ?2,
            loyalty_points = loyalty_points + ?3,
            last_visit_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(customer_id)
    .bind(amount_iqd)
    .bind(points)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::not_found("Customer", customer_id));
    }

    Ok(())
}

/// Exact inverse of [`record_purchase`], clamped at zero per field.
///
/// `last_visit_at` is left alone: the visit happened even if the sale
/// was voided.
pub async fn revert_purchase(
    conn: &mut SqliteConnection,
    customer_id: &str,
    amount_iqd: i64,
) -> LedgerResult<()> {
    debug!(customer_id, amount_iqd, "Reverting customer purchase");

    let points = loyalty_points_for(amount_iqd);
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET total_visits = MAX(total_visits - 1, 0),
            total_spent_iqd = MAX(total_spent_iqd - ?2, 0),
            loyalty_points = MAX(loyalty_points - ?3, 0)
        WHERE id = ?1
        "#,
    )
    .bind(customer_id)
    .bind(amount_iqd)
    .bind(points)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::not_found("Customer", customer_id));
    }

    Ok(())
}

/// Repository for customer records.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    pub async fn insert(&self, new: &NewCustomer) -> LedgerResult<Customer> {
        self.insert_with_id(&Uuid::new_v4().to_string(), new).await
    }

    /// Insert with a caller-chosen id (fixtures, import).
    pub async fn insert_with_id(&self, id: &str, new: &NewCustomer) -> LedgerResult<Customer> {
        let customer = Customer {
            id: id.to_string(),
            name: new.name.clone(),
            phone: new.phone.clone(),
            total_visits: 0,
            total_spent_iqd: 0,
            loyalty_points: 0,
            last_visit_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, phone, total_visits, total_spent_iqd,
                                   loyalty_points, last_visit_at, created_at)
            VALUES (?1, ?2, ?3, 0, 0, 0, NULL, ?4)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        Ok(customer)
    }

    pub async fn get(&self, id: &str) -> LedgerResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, phone, total_visits, total_spent_iqd, loyalty_points,
                   last_visit_at, created_at
            FROM customers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    /// Pool-level wrapper around [`record_purchase`] for post-commit use.
    pub async fn record_purchase(&self, customer_id: &str, amount_iqd: i64) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await?;
        record_purchase(&mut conn, customer_id, amount_iqd).await
    }
}
