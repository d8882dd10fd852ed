//! PostgreSQL store implementation.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! The compare-and-set transition is a single conditional UPDATE, so
//! concurrent callers racing on the same row resolve at the storage layer:
//! exactly one UPDATE matches, the rest see zero affected rows.
//!
//! # Schema
//!
//! See `schema.sql` at the crate root:
//! - `variants (id uuid PK, name text, stock bigint, reserved bigint,
//!    created_at timestamptz, updated_at timestamptz)`
//! - `reservations (id uuid PK, variant_id uuid, quantity bigint,
//!    order_id uuid, status text, created_at timestamptz,
//!    expires_at timestamptz)`

use crate::error::StoreError;
use crate::repository::{ReservationRepository, Store, VariantRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use stockroom_domain::{
    Reservation, ReservationId, ReservationStatus, Variant, VariantId,
};

/// PostgreSQL-backed store.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store around an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_reservation_row(row: &sqlx::postgres::PgRow) -> Result<Reservation, StoreError> {
    let status_str: String = row
        .try_get("status")
        .map_err(|e| StoreError::Database(format!("Failed to read status: {}", e)))?;
    let status = ReservationStatus::parse(&status_str)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Reservation {
        id: row.try_get("id").map_err(StoreError::from)?,
        variant_id: row.try_get("variant_id").map_err(StoreError::from)?,
        quantity: row.try_get("quantity").map_err(StoreError::from)?,
        order_id: row.try_get("order_id").map_err(StoreError::from)?,
        status,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        expires_at: row.try_get("expires_at").map_err(StoreError::from)?,
    })
}

fn parse_variant_row(row: &sqlx::postgres::PgRow) -> Result<Variant, StoreError> {
    Ok(Variant {
        id: row.try_get("id").map_err(StoreError::from)?,
        name: row.try_get("name").map_err(StoreError::from)?,
        stock: row.try_get("stock").map_err(StoreError::from)?,
        reserved: row.try_get("reserved").map_err(StoreError::from)?,
        created_at: row.try_get("created_at").map_err(StoreError::from)?,
        updated_at: row.try_get("updated_at").map_err(StoreError::from)?,
    })
}

// =============================================================================
// Reservation Repository Implementation
// =============================================================================

#[async_trait]
impl ReservationRepository for PgStore {
    async fn create(&self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO reservations
                (id, variant_id, quantity, order_id, status, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.variant_id)
        .bind(reservation.quantity)
        .bind(reservation.order_id)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, variant_id, quantity, order_id, status, created_at, expires_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_reservation_row).transpose()
    }

    async fn find_active_by_variant(
        &self,
        variant_id: VariantId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, variant_id, quantity, order_id, status, created_at, expires_at
            FROM reservations
            WHERE variant_id = $1
              AND status = 'active'
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_reservation_row).collect()
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, variant_id, quantity, order_id, status, created_at, expires_at
            FROM reservations
            WHERE status = 'active'
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_reservation_row).collect()
    }

    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $3
            WHERE id = $1
              AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Zero rows: lost race (no-op) or missing row. Distinguish so the
        // caller sees missing ledger rows as an error, not a silent no-op.
        let exists = sqlx::query("SELECT 1 FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if exists {
            Ok(false)
        } else {
            Err(StoreError::not_found("reservation", id.to_string()))
        }
    }

    async fn extend_expiry(
        &self,
        id: ReservationId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET expires_at = $2
            WHERE id = $1
              AND status = 'active'
            "#,
        )
        .bind(id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .is_some();

        if exists {
            Ok(false)
        } else {
            Err(StoreError::not_found("reservation", id.to_string()))
        }
    }

    async fn delete(&self, id: ReservationId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(StoreError::not_found("reservation", id.to_string()))
        }
    }
}

// =============================================================================
// Variant Repository Implementation
// =============================================================================

#[async_trait]
impl VariantRepository for PgStore {
    async fn save(&self, variant: &Variant) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO variants (id, name, stock, reserved, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                stock = EXCLUDED.stock,
                reserved = EXCLUDED.reserved,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(variant.id)
        .bind(&variant.name)
        .bind(variant.stock)
        .bind(variant.reserved)
        .bind(variant.created_at)
        .bind(variant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, stock, reserved, created_at, updated_at
            FROM variants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(parse_variant_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Variant>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, stock, reserved, created_at, updated_at
            FROM variants
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_variant_row).collect()
    }

    async fn adjust_reserved(&self, id: VariantId, delta: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE variants
            SET reserved = GREATEST(0, reserved + $2),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(StoreError::not_found("variant", id.to_string()))
        }
    }

    async fn set_reserved(&self, id: VariantId, value: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE variants
            SET reserved = GREATEST(0, $2),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(())
        } else {
            Err(StoreError::not_found("variant", id.to_string()))
        }
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for PgStore {
    fn reservations(&self) -> &dyn ReservationRepository {
        self
    }

    fn variants(&self) -> &dyn VariantRepository {
        self
    }
}
