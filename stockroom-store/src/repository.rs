//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the reservation core.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stockroom_domain::{
    Reservation, ReservationId, ReservationStatus, Variant, VariantId,
};

/// Repository for Reservation rows (the ledger)
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist a new reservation row.
    ///
    /// The reservation is validated at construction (`Reservation::new`),
    /// so a row that reaches the ledger is well-formed.
    async fn create(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Find a reservation by ID
    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// All Active holds for a variant, used to compute the live reserved
    /// sum. Ordering is irrelevant.
    async fn find_active_by_variant(
        &self,
        variant_id: VariantId,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Active holds whose expiry is at or before `now`
    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError>;

    /// Atomic compare-and-set status transition.
    ///
    /// Returns `false` (a no-op, not an error) when the current status does
    /// not match `from`. This guards double-release/double-expire races:
    /// exactly one caller wins, the others observe the no-op.
    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool, StoreError>;

    /// Push an Active hold's expiry out to `expires_at`.
    ///
    /// Returns `false` (a no-op) when the hold is already terminal, so a
    /// user extending while the sweep expires races safely. Errors when the
    /// row is missing.
    async fn extend_expiry(
        &self,
        id: ReservationId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Permanent removal. Used only for ephemeral/test holds, never for the
    /// normal lifecycle (terminal rows are kept for audit).
    async fn delete(&self, id: ReservationId) -> Result<(), StoreError>;
}

/// Repository for Variant rows (stock and the denormalized counter)
#[async_trait]
pub trait VariantRepository: Send + Sync {
    /// Save a variant (insert or update)
    async fn save(&self, variant: &Variant) -> Result<(), StoreError>;

    /// Find a variant by ID
    async fn find_by_id(&self, id: VariantId) -> Result<Option<Variant>, StoreError>;

    /// All variants known to the reservation core
    async fn find_all(&self) -> Result<Vec<Variant>, StoreError>;

    /// Adjust the denormalized reserved counter by `delta`, floored at zero
    async fn adjust_reserved(&self, id: VariantId, delta: i64) -> Result<(), StoreError>;

    /// Overwrite the denormalized reserved counter (reconcile path)
    async fn set_reserved(&self, id: VariantId, value: i64) -> Result<(), StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get reservation repository
    fn reservations(&self) -> &dyn ReservationRepository;

    /// Get variant repository
    fn variants(&self) -> &dyn VariantRepository;
}
