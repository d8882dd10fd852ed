//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access.
//!
//! The compare-and-set transition holds the write lock for the whole
//! read-modify-write, giving the same atomicity the PostgreSQL
//! implementation gets from a conditional UPDATE.

use crate::error::StoreError;
use crate::repository::{ReservationRepository, Store, VariantRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use stockroom_domain::{
    Reservation, ReservationId, ReservationStatus, Variant, VariantId,
};

/// In-memory store for testing
pub struct MemoryStore {
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
    variants: RwLock<HashMap<VariantId, Variant>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            reservations: RwLock::new(HashMap::new()),
            variants: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of reservations
    pub fn reservation_count(&self) -> usize {
        self.reservations.read().unwrap().len()
    }

    /// Get the number of variants
    pub fn variant_count(&self) -> usize {
        self.variants.read().unwrap().len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        self.reservations.write().unwrap().clear();
        self.variants.write().unwrap().clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Reservation Repository Implementation
// =============================================================================

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn create(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write().unwrap();
        if reservations.contains_key(&reservation.id) {
            return Err(StoreError::duplicate(
                "reservation",
                reservation.id.to_string(),
            ));
        }
        reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let reservations = self.reservations.read().unwrap();
        Ok(reservations.get(&id).cloned())
    }

    async fn find_active_by_variant(
        &self,
        variant_id: VariantId,
    ) -> Result<Vec<Reservation>, StoreError> {
        let reservations = self.reservations.read().unwrap();
        Ok(reservations
            .values()
            .filter(|r| r.variant_id == variant_id && r.is_active())
            .cloned()
            .collect())
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError> {
        let reservations = self.reservations.read().unwrap();
        Ok(reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        to: ReservationStatus,
    ) -> Result<bool, StoreError> {
        let mut reservations = self.reservations.write().unwrap();
        match reservations.get_mut(&id) {
            Some(reservation) if reservation.status == from => {
                reservation.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("reservation", id.to_string())),
        }
    }

    async fn extend_expiry(
        &self,
        id: ReservationId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut reservations = self.reservations.write().unwrap();
        match reservations.get_mut(&id) {
            Some(reservation) if reservation.is_active() => {
                reservation.expires_at = expires_at;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("reservation", id.to_string())),
        }
    }

    async fn delete(&self, id: ReservationId) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write().unwrap();
        if reservations.remove(&id).is_some() {
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
impl VariantRepository for MemoryStore {
    async fn save(&self, variant: &Variant) -> Result<(), StoreError> {
        let mut variants = self.variants.write().unwrap();
        variants.insert(variant.id, variant.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: VariantId) -> Result<Option<Variant>, StoreError> {
        let variants = self.variants.read().unwrap();
        Ok(variants.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Variant>, StoreError> {
        let variants = self.variants.read().unwrap();
        Ok(variants.values().cloned().collect())
    }

    async fn adjust_reserved(&self, id: VariantId, delta: i64) -> Result<(), StoreError> {
        let mut variants = self.variants.write().unwrap();
        match variants.get_mut(&id) {
            Some(variant) => {
                variant.reserved = (variant.reserved + delta).max(0);
                variant.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::not_found("variant", id.to_string())),
        }
    }

    async fn set_reserved(&self, id: VariantId, value: i64) -> Result<(), StoreError> {
        let mut variants = self.variants.write().unwrap();
        match variants.get_mut(&id) {
            Some(variant) => {
                variant.reserved = value.max(0);
                variant.updated_at = Utc::now();
                Ok(())
            }
            None => Err(StoreError::not_found("variant", id.to_string())),
        }
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn reservations(&self) -> &dyn ReservationRepository {
        self
    }

    fn variants(&self) -> &dyn VariantRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
