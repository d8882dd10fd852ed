//! Domain entities for Stockroom
//!
//! Core business entities with lifecycle management.
//! All entities have identity and validated state transitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a product Variant
pub type VariantId = Uuid;

/// Unique identifier for a Reservation (hold)
pub type ReservationId = Uuid;

/// Unique identifier for an Order (owned by the checkout collaborator)
pub type OrderId = Uuid;

// =============================================================================
// Errors
// =============================================================================

/// Domain errors for entity validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Stock must be non-negative
    #[error("Invalid stock: {0}")]
    InvalidStock(String),

    /// Invalid reservation state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Reservation Status
// =============================================================================

/// Lifecycle status of a reservation.
///
/// State machine: `Active -> {Committed, Released, Expired}`.
/// All three target states are terminal; only Active holds count toward
/// a variant's reserved total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Hold is live and counts toward the reserved total
    Active,
    /// Owning order was paid/confirmed; kept for audit
    Committed,
    /// Explicitly cancelled by the caller
    Released,
    /// TTL elapsed before commit; expired by the sweep
    Expired,
}

impl ReservationStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }

    /// Stable string form used by storage layers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Committed => "committed",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        }
    }

    /// Parse the storage string form.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` for unknown values.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "active" => Ok(ReservationStatus::Active),
            "committed" => Ok(ReservationStatus::Committed),
            "released" => Ok(ReservationStatus::Released),
            "expired" => Ok(ReservationStatus::Expired),
            other => Err(DomainError::InvalidStateTransition(format!(
                "Unknown reservation status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Reservation
// =============================================================================

/// Reservation represents a temporary hold on variant stock.
///
/// Created Active when checkout begins; expires automatically after its TTL
/// unless committed or released first.
///
/// # Invariants
/// - `quantity > 0`
/// - `expires_at = created_at + ttl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub variant_id: VariantId,
    pub quantity: i64,
    pub order_id: OrderId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Default hold TTL: 5 minutes.
    pub const DEFAULT_TTL_SECS: i64 = 300;

    /// Create a new Active reservation.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if `quantity <= 0`.
    pub fn new(
        variant_id: VariantId,
        quantity: i64,
        order_id: OrderId,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        if quantity <= 0 {
            return Err(DomainError::InvalidQuantity(format!(
                "Reservation quantity must be positive, got {}",
                quantity
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            variant_id,
            quantity,
            order_id,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + ttl,
        })
    }

    /// Whether this hold still counts toward the reserved total.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Whether the hold's TTL has elapsed at `now`.
    ///
    /// Expiry is only meaningful for Active holds; terminal holds never
    /// re-expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at <= now
    }
}

// =============================================================================
// Variant
// =============================================================================

/// Variant is the reservation core's view of a sellable product variant.
///
/// `reserved` is a denormalized cache of the live hold sum; it is maintained
/// incrementally and repaired by reconcile, so `reserved <= stock` is a
/// target rather than a hard invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    /// On-hand stock quantity (non-negative)
    pub stock: i64,
    /// Cached sum of live (Active) hold quantities (non-negative)
    pub reserved: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Variant {
    /// Create a new variant with the given on-hand stock and no live holds.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStock` if `stock < 0`.
    pub fn new(name: impl Into<String>, stock: i64) -> Result<Self, DomainError> {
        if stock < 0 {
            return Err(DomainError::InvalidStock(format!(
                "Variant stock must be non-negative, got {}",
                stock
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            name: name.into(),
            stock,
            reserved: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
