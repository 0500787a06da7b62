//! PostgreSQL-backed durable store implementations.
//!
//! Carts and checkouts are stored as JSONB documents; key, status and
//! expiry columns are extracted for indexing. The partial unique index
//! `unique_active_checkout_per_user` enforces at most one lock-holding
//! checkout per user at the database level.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{Cart, Checkout, CheckoutId};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::durable::{CartStore, CheckoutStore};
use crate::error::{Result, StoreError};

/// PostgreSQL cart repository.
#[derive(Clone)]
pub struct PostgresCartStore {
    pool: PgPool,
}

impl PostgresCartStore {
    /// Creates a new PostgreSQL cart store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_cart(row: PgRow) -> Result<Cart> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[async_trait]
impl CartStore for PostgresCartStore {
    async fn find_by_user_id(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT doc FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_cart).transpose()
    }

    async fn save(&self, cart: &Cart) -> Result<Cart> {
        let mut tx = self.pool.begin().await?;

        // Lock the row so the version bump is race-free; last write wins
        // on the document itself.
        let existing = sqlx::query("SELECT version, created_at FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(cart.user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

        let mut stored = cart.clone();
        stored.updated_at = Utc::now();
        match existing {
            Some(row) => {
                stored.version = row.try_get::<i64, _>("version")? + 1;
                stored.created_at = row.try_get("created_at")?;
            }
            None => {
                stored.version = 1;
            }
        }

        let doc = serde_json::to_value(&stored)?;
        sqlx::query(
            r#"
            INSERT INTO carts (user_id, version, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                version = EXCLUDED.version,
                doc = EXCLUDED.doc,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(stored.user_id.as_uuid())
        .bind(stored.version)
        .bind(doc)
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_by_user_id(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// PostgreSQL checkout repository.
#[derive(Clone)]
pub struct PostgresCheckoutStore {
    pool: PgPool,
}

impl PostgresCheckoutStore {
    /// Creates a new PostgreSQL checkout store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_checkout(row: PgRow) -> Result<Checkout> {
        let doc: serde_json::Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    async fn find_by_checkout_id(&self, checkout_id: &CheckoutId) -> Result<Option<Checkout>> {
        let row = sqlx::query("SELECT doc FROM checkouts WHERE checkout_id = $1")
            .bind(checkout_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_checkout).transpose()
    }

    async fn find_active_by_user_id(&self, user_id: UserId) -> Result<Option<Checkout>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM checkouts
            WHERE user_id = $1 AND status IN ('RESERVED', 'WAITING_PAYMENT')
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_checkout).transpose()
    }

    async fn insert_active(&self, checkout: &Checkout) -> Result<()> {
        let doc = serde_json::to_value(checkout)?;

        sqlx::query(
            r#"
            INSERT INTO checkouts (checkout_id, user_id, status, expires_at, doc, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(checkout.checkout_id.as_str())
        .bind(checkout.user_id.as_uuid())
        .bind(checkout.status.as_str())
        .bind(checkout.expires_at)
        .bind(doc)
        .bind(checkout.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_active_checkout_per_user")
            {
                return StoreError::ActiveCheckoutExists {
                    user_id: checkout.user_id,
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn save(&self, checkout: &Checkout) -> Result<()> {
        let doc = serde_json::to_value(checkout)?;

        sqlx::query(
            r#"
            UPDATE checkouts
            SET status = $2, expires_at = $3, doc = $4
            WHERE checkout_id = $1
            "#,
        )
        .bind(checkout.checkout_id.as_str())
        .bind(checkout.status.as_str())
        .bind(checkout.expires_at)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_expired(&self, cutoff: DateTime<Utc>, limit: u32) -> Result<Vec<Checkout>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM checkouts
            WHERE status IN ('RESERVED', 'WAITING_PAYMENT') AND expires_at < $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_checkout).collect()
    }

    async fn delete(&self, checkout_id: &CheckoutId) -> Result<()> {
        sqlx::query("DELETE FROM checkouts WHERE checkout_id = $1")
            .bind(checkout_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
