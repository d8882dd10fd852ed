//! Reservation service: the hold lifecycle state machine.
//!
//! Orchestrates create/release/commit/expire of holds against the ledger and
//! keeps the denormalized reserved counter in sync with it.
//!
//! # Concurrency
//!
//! The reserve read-check-write sequence is serialized per variant with an
//! async mutex held across the whole sequence; different variants proceed
//! independently and no global lock exists. Counter updates and event
//! broadcasts are not atomic with the ledger write: the counter is a cache,
//! and `reconcile` is the convergence path when a partial failure leaves it
//! stale. Callers must not assume the counter is instantaneously exact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use stockroom_domain::{
    availability, OrderId, Reservation, ReservationId, ReservationStatus, StockEvent, Variant,
    VariantId,
};
use stockroom_store::Store;

use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::EventBus;

// =============================================================================
// Stock Levels
// =============================================================================

/// Per-variant stock snapshot for the storefront query endpoint.
///
/// `reserved` and `available` are computed from live ledger holds, not from
/// the cached counter, so the answer is authoritative even under drift.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevel {
    pub variant_id: VariantId,
    pub name: String,
    pub stock: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
}

// =============================================================================
// Reservation Service
// =============================================================================

/// The reservation service.
pub struct ReservationService<S: Store> {
    store: Arc<S>,
    event_bus: Arc<EventBus>,
    ttl: Duration,
    /// Per-variant serialization locks for the reserve/reconcile sequence.
    /// The outer mutex only guards the map itself and is never held across
    /// an await point.
    locks: StdMutex<HashMap<VariantId, Arc<Mutex<()>>>>,
}

impl<S: Store> ReservationService<S> {
    /// Create a new service with the given hold TTL.
    pub fn new(store: Arc<S>, event_bus: Arc<EventBus>, ttl: Duration) -> Self {
        Self {
            store,
            event_bus,
            ttl,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn variant_lock(&self, variant_id: VariantId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(variant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Register a variant with the reservation core.
    pub async fn create_variant(&self, name: impl Into<String>, stock: i64) -> DaemonResult<Variant> {
        let variant = Variant::new(name, stock)?;
        self.store.variants().save(&variant).await?;
        info!(variant_id = %variant.id, stock = variant.stock, "Variant registered");
        Ok(variant)
    }

    /// Look up a variant by id.
    pub async fn get_variant(&self, variant_id: VariantId) -> DaemonResult<Variant> {
        self.store
            .variants()
            .find_by_id(variant_id)
            .await?
            .ok_or(DaemonError::VariantNotFound(variant_id))
    }

    /// Reserve `quantity` units of a variant for an in-progress order.
    ///
    /// Serialized per variant: availability is re-read under the variant
    /// lock, so two concurrent reservations cannot both observe stale
    /// availability and oversell.
    ///
    /// # Errors
    /// - `DomainError::InvalidQuantity` for non-positive quantities
    /// - `InsufficientStock` when availability cannot cover the request
    pub async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i64,
        order_id: OrderId,
    ) -> DaemonResult<Reservation> {
        // Validates quantity before any ledger traffic
        let reservation = Reservation::new(variant_id, quantity, order_id, self.ttl)?;

        let lock = self.variant_lock(variant_id);
        let _guard = lock.lock().await;

        let variant = self
            .store
            .variants()
            .find_by_id(variant_id)
            .await?
            .ok_or(DaemonError::VariantNotFound(variant_id))?;

        let live_reserved = self.live_reserved_sum(variant_id).await?;

        if !availability::can_reserve(variant.stock, live_reserved, quantity) {
            return Err(DaemonError::InsufficientStock {
                variant_id,
                requested: quantity,
                available: availability::available(variant.stock, live_reserved),
            });
        }

        self.store.reservations().create(&reservation).await?;

        // The ledger row is committed; a counter failure from here on is
        // drift, repaired by reconcile, not a failed reservation.
        if let Err(e) = self.store.variants().adjust_reserved(variant_id, quantity).await {
            warn!(
                %variant_id,
                reservation_id = %reservation.id,
                error = %e,
                "Reserved counter bump failed, leaving for reconcile"
            );
        }

        drop(_guard);

        info!(
            reservation_id = %reservation.id,
            %variant_id,
            quantity,
            %order_id,
            "Reservation created"
        );
        self.event_bus
            .send(StockEvent::reservation_created(variant_id, quantity));

        Ok(reservation)
    }

    /// Extend an Active hold by one TTL from now (checkout taking longer
    /// than expected).
    ///
    /// Races safely with the sweep through the store's guarded update: if
    /// the hold went terminal first, the extension is a no-op and the
    /// returned reservation carries the terminal status so the caller can
    /// see the hold is gone and re-reserve. No event is emitted either way
    /// since availability does not change.
    pub async fn extend(&self, reservation_id: ReservationId) -> DaemonResult<Reservation> {
        let new_expiry = Utc::now() + self.ttl;
        let extended = self
            .store
            .reservations()
            .extend_expiry(reservation_id, new_expiry)
            .await?;

        if extended {
            debug!(%reservation_id, expires_at = %new_expiry, "Reservation extended");
        } else {
            debug!(%reservation_id, "Extend was a no-op, reservation already terminal");
        }

        self.store
            .reservations()
            .find_by_id(reservation_id)
            .await?
            .ok_or(DaemonError::ReservationNotFound(reservation_id))
    }

    /// Release a hold (explicit cancellation).
    ///
    /// Idempotent: releasing an already-terminal reservation reports success
    /// and changes nothing.
    pub async fn release(&self, reservation_id: ReservationId) -> DaemonResult<()> {
        self.finish(reservation_id, ReservationStatus::Released).await
    }

    /// Commit a hold: the owning order was paid/confirmed.
    ///
    /// Decrements the reserved counter (the hold is no longer pending) but
    /// does not touch on-hand stock; that is the fulfillment collaborator's
    /// job. Idempotent like `release`.
    pub async fn commit(&self, reservation_id: ReservationId) -> DaemonResult<()> {
        self.finish(reservation_id, ReservationStatus::Committed).await
    }

    /// Shared Active -> terminal transition for release and commit.
    async fn finish(&self, reservation_id: ReservationId, to: ReservationStatus) -> DaemonResult<()> {
        let reservation = self
            .store
            .reservations()
            .find_by_id(reservation_id)
            .await?
            .ok_or(DaemonError::ReservationNotFound(reservation_id))?;

        let won = self
            .store
            .reservations()
            .transition(reservation_id, ReservationStatus::Active, to)
            .await?;

        if !won {
            // Lost the race (sweep expired it, or a duplicate call):
            // a successful no-op from the caller's perspective
            debug!(%reservation_id, status = %to, "Transition was a no-op, reservation already terminal");
            return Ok(());
        }

        if let Err(e) = self
            .store
            .variants()
            .adjust_reserved(reservation.variant_id, -reservation.quantity)
            .await
        {
            warn!(
                variant_id = %reservation.variant_id,
                %reservation_id,
                error = %e,
                "Reserved counter decrement failed, leaving for reconcile"
            );
        }

        info!(%reservation_id, variant_id = %reservation.variant_id, status = %to, "Reservation finished");
        self.event_bus
            .send(StockEvent::stock_update(vec![reservation.variant_id]));

        Ok(())
    }

    /// Expire all Active holds whose TTL elapsed at `now`.
    ///
    /// Per-row failures are logged and skipped; the sweep never aborts.
    /// Emits one `STOCK_UPDATE` per affected variant rather than one per
    /// reservation to bound event volume. Returns the number of holds
    /// expired by this run.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> DaemonResult<usize> {
        let expired = self.store.reservations().find_expired(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut freed: HashMap<VariantId, i64> = HashMap::new();
        let mut count = 0;

        for reservation in expired {
            match self
                .store
                .reservations()
                .transition(
                    reservation.id,
                    ReservationStatus::Active,
                    ReservationStatus::Expired,
                )
                .await
            {
                Ok(true) => {
                    *freed.entry(reservation.variant_id).or_insert(0) += reservation.quantity;
                    count += 1;
                }
                Ok(false) => {
                    // Another sweep or a release/commit got there first
                    debug!(reservation_id = %reservation.id, "Expiry lost the race, skipping");
                }
                Err(e) => {
                    warn!(reservation_id = %reservation.id, error = %e, "Failed to expire reservation, skipping");
                }
            }
        }

        for (variant_id, quantity) in freed {
            if let Err(e) = self.store.variants().adjust_reserved(variant_id, -quantity).await {
                warn!(%variant_id, error = %e, "Reserved counter decrement failed during sweep, leaving for reconcile");
            }
            self.event_bus.send(StockEvent::stock_update(vec![variant_id]));
        }

        if count > 0 {
            info!(count, "Expired stale reservations");
        }
        Ok(count)
    }

    /// Recompute the denormalized reserved counter from the ledger and
    /// overwrite the cached value.
    ///
    /// The authoritative drift repair path. Takes the same per-variant lock
    /// as `reserve`, so it is safe to call at any time, including
    /// concurrently with reservation traffic. Returns the fresh counter.
    pub async fn reconcile(&self, variant_id: VariantId) -> DaemonResult<i64> {
        let lock = self.variant_lock(variant_id);
        let _guard = lock.lock().await;

        // Ensure the variant exists before overwriting anything
        self.store
            .variants()
            .find_by_id(variant_id)
            .await?
            .ok_or(DaemonError::VariantNotFound(variant_id))?;

        let live_reserved = self.live_reserved_sum(variant_id).await?;
        self.store.variants().set_reserved(variant_id, live_reserved).await?;

        debug!(%variant_id, reserved = live_reserved, "Reconciled reserved counter");
        Ok(live_reserved)
    }

    /// Stock levels for every known variant, computed from live holds.
    pub async fn stock_levels(&self) -> DaemonResult<Vec<StockLevel>> {
        let variants = self.store.variants().find_all().await?;
        let mut levels = Vec::with_capacity(variants.len());

        for variant in variants {
            let live_reserved = self.live_reserved_sum(variant.id).await?;
            levels.push(StockLevel {
                variant_id: variant.id,
                name: variant.name,
                stock: variant.stock,
                reserved_stock: live_reserved,
                available_stock: availability::available(variant.stock, live_reserved),
            });
        }

        Ok(levels)
    }

    /// Announce that the checkout collaborator created an order covering the
    /// given variants. Published for subscribers; no ledger changes here.
    pub fn publish_order_created(&self, variant_ids: Vec<VariantId>) {
        self.event_bus.send(StockEvent::order_created(variant_ids));
    }

    /// Variant ids currently known to the store (reconcile scheduling).
    pub async fn variant_ids(&self) -> DaemonResult<Vec<VariantId>> {
        let variants = self.store.variants().find_all().await?;
        Ok(variants.into_iter().map(|v| v.id).collect())
    }

    async fn live_reserved_sum(&self, variant_id: VariantId) -> DaemonResult<i64> {
        let holds = self
            .store
            .reservations()
            .find_active_by_variant(variant_id)
            .await?;
        Ok(holds.iter().map(|r| r.quantity).sum())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_domain::StockEventKind;
    use stockroom_store::MemoryStore;
    use uuid::Uuid;

    fn create_service() -> (Arc<ReservationService<MemoryStore>>, Arc<EventBus>) {
        let store = Arc::new(MemoryStore::new());
        let event_bus = Arc::new(EventBus::new(100));
        let service = Arc::new(ReservationService::new(
            store,
            event_bus.clone(),
            Duration::minutes(5),
        ));
        (service, event_bus)
    }

    async fn available_for(
        service: &ReservationService<MemoryStore>,
        variant_id: VariantId,
    ) -> i64 {
        service
            .stock_levels()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.variant_id == variant_id)
            .unwrap()
            .available_stock
    }

    #[tokio::test]
    async fn test_reserve_happy_path() {
        let (service, event_bus) = create_service();
        let mut receiver = event_bus.subscribe();

        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 7, Uuid::now_v7()).await.unwrap();

        assert_eq!(reservation.quantity, 7);
        assert_eq!(available_for(&service, variant.id).await, 3);

        let event = receiver.recv().await.unwrap().unwrap();
        assert_eq!(event.kind, StockEventKind::ReservationCreated);
        assert_eq!(event.variant_ids, vec![variant.id]);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_stock() {
        // stock=10: reserve 7 succeeds, reserve 5 fails, availability
        // unchanged, releasing the first restores 10
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();

        let first = service.reserve(variant.id, 7, Uuid::now_v7()).await.unwrap();
        assert_eq!(available_for(&service, variant.id).await, 3);

        let second = service.reserve(variant.id, 5, Uuid::now_v7()).await;
        match second {
            Err(DaemonError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 5);
                assert_eq!(available, 3);
            }
            other => panic!("Expected InsufficientStock, got {:?}", other.map(|r| r.id)),
        }
        assert_eq!(available_for(&service, variant.id).await, 3);

        service.release(first.id).await.unwrap();
        assert_eq!(available_for(&service, variant.id).await, 10);
    }

    #[tokio::test]
    async fn test_reserve_rejects_invalid_quantity() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();

        let result = service.reserve(variant.id, 0, Uuid::now_v7()).await;
        assert!(matches!(result, Err(DaemonError::Domain(_))));
    }

    #[tokio::test]
    async fn test_reserve_unknown_variant() {
        let (service, _bus) = create_service();
        let result = service.reserve(Uuid::now_v7(), 1, Uuid::now_v7()).await;
        assert!(matches!(result, Err(DaemonError::VariantNotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_reserve_no_oversell() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("drop item", 5).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let service = service.clone();
            let variant_id = variant.id;
            handles.push(tokio::spawn(async move {
                service.reserve(variant_id, 1, Uuid::now_v7()).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        // Exactly the stock's worth of single-unit holds can win
        assert_eq!(succeeded, 5);
        assert_eq!(available_for(&service, variant.id).await, 0);
    }

    #[tokio::test]
    async fn test_release_idempotent() {
        let (service, event_bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();

        service.release(reservation.id).await.unwrap();
        let reserved_after_first = service.get_variant(variant.id).await.unwrap().reserved;
        assert_eq!(reserved_after_first, 0);

        // Second release: success, no further counter change, no event
        let mut receiver = event_bus.subscribe();
        service.release(reservation.id).await.unwrap();
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 0);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_extend_pushes_expiry_out() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();

        let extended = service.extend(reservation.id).await.unwrap();
        assert_eq!(extended.status, ReservationStatus::Active);
        assert!(extended.expires_at > reservation.expires_at);
        // Availability unchanged by an extension
        assert_eq!(available_for(&service, variant.id).await, 6);
    }

    #[tokio::test]
    async fn test_extend_terminal_hold_is_noop() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();
        service.release(reservation.id).await.unwrap();

        // The caller sees the terminal status and an unchanged expiry
        let after = service.extend(reservation.id).await.unwrap();
        assert_eq!(after.status, ReservationStatus::Released);
        assert_eq!(after.expires_at, reservation.expires_at);
    }

    #[tokio::test]
    async fn test_extend_unknown_reservation() {
        let (service, _bus) = create_service();
        let result = service.extend(Uuid::now_v7()).await;
        assert!(matches!(result, Err(DaemonError::ReservationNotFound(_))));
    }

    #[tokio::test]
    async fn test_commit_idempotent_and_keeps_stock() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();

        service.commit(reservation.id).await.unwrap();

        let after = service.get_variant(variant.id).await.unwrap();
        // Reserved counter drops; on-hand stock untouched (fulfillment owns it)
        assert_eq!(after.reserved, 0);
        assert_eq!(after.stock, 10);

        service.commit(reservation.id).await.unwrap();
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_release_after_commit_is_noop() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();

        service.commit(reservation.id).await.unwrap();
        // Cancelling a committed hold: successful no-op, counter unchanged
        service.release(reservation.id).await.unwrap();
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_release_unknown_reservation() {
        let (service, _bus) = create_service();
        let result = service.release(Uuid::now_v7()).await;
        assert!(matches!(result, Err(DaemonError::ReservationNotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_expires_stale_holds() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 6, Uuid::now_v7()).await.unwrap();

        // Before expiry (2 minutes in): sweep leaves it Active
        let early = reservation.created_at + Duration::minutes(2);
        assert_eq!(service.sweep_expired(early).await.unwrap(), 0);
        assert_eq!(available_for(&service, variant.id).await, 4);

        // After expiry (6 minutes in): expired, availability restored
        let late = reservation.created_at + Duration::minutes(6);
        assert_eq!(service.sweep_expired(late).await.unwrap(), 1);
        assert_eq!(available_for(&service, variant.id).await, 10);
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_expire_exactly_once() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let reservation = service.reserve(variant.id, 6, Uuid::now_v7()).await.unwrap();
        let late = reservation.created_at + Duration::minutes(6);

        let (a, b) = tokio::join!(service.sweep_expired(late), service.sweep_expired(late));
        let total = a.unwrap() + b.unwrap();

        assert_eq!(total, 1);
        // Counter decremented exactly once, not driven negative
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 0);
        assert_eq!(available_for(&service, variant.id).await, 10);
    }

    #[tokio::test]
    async fn test_sweep_batches_one_event_per_variant() {
        let (service, event_bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        let r1 = service.reserve(variant.id, 2, Uuid::now_v7()).await.unwrap();
        let r2 = service.reserve(variant.id, 3, Uuid::now_v7()).await.unwrap();
        let late = r1.created_at.max(r2.created_at) + Duration::minutes(6);

        let mut receiver = event_bus.subscribe();
        assert_eq!(service.sweep_expired(late).await.unwrap(), 2);

        // Two holds expired, but the variant gets a single STOCK_UPDATE
        let event = receiver.recv().await.unwrap().unwrap();
        assert_eq!(event.kind, StockEventKind::StockUpdate);
        assert_eq!(event.variant_ids, vec![variant.id]);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 10).await.unwrap();
        service.reserve(variant.id, 3, Uuid::now_v7()).await.unwrap();
        service.reserve(variant.id, 2, Uuid::now_v7()).await.unwrap();

        // Simulate drift from a partial failure
        let store_variant = service.get_variant(variant.id).await.unwrap();
        assert_eq!(store_variant.reserved, 5);
        service
            .store
            .variants()
            .set_reserved(variant.id, 99)
            .await
            .unwrap();

        let reconciled = service.reconcile(variant.id).await.unwrap();
        assert_eq!(reconciled, 5);
        assert_eq!(service.get_variant(variant.id).await.unwrap().reserved, 5);
    }

    #[tokio::test]
    async fn test_reconcile_after_interleavings() {
        let (service, _bus) = create_service();
        let variant = service.create_variant("shirt", 20).await.unwrap();

        let r1 = service.reserve(variant.id, 3, Uuid::now_v7()).await.unwrap();
        let r2 = service.reserve(variant.id, 4, Uuid::now_v7()).await.unwrap();
        let r3 = service.reserve(variant.id, 5, Uuid::now_v7()).await.unwrap();

        service.release(r1.id).await.unwrap();
        service.commit(r2.id).await.unwrap();
        let late = r3.created_at + Duration::minutes(6);
        service.sweep_expired(late).await.unwrap();

        // No live holds remain; reconcile agrees with the ledger
        assert_eq!(service.reconcile(variant.id).await.unwrap(), 0);

        let r4 = service.reserve(variant.id, 7, Uuid::now_v7()).await.unwrap();
        assert_eq!(service.reconcile(variant.id).await.unwrap(), 7);
        assert_eq!(
            service.get_variant(variant.id).await.unwrap().reserved,
            r4.quantity
        );
    }

    #[tokio::test]
    async fn test_stock_levels_snapshot() {
        let (service, _bus) = create_service();
        let a = service.create_variant("a", 10).await.unwrap();
        let b = service.create_variant("b", 3).await.unwrap();
        service.reserve(a.id, 4, Uuid::now_v7()).await.unwrap();

        let mut levels = service.stock_levels().await.unwrap();
        levels.sort_by_key(|l| l.stock);

        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].variant_id, b.id);
        assert_eq!(levels[0].available_stock, 3);
        assert_eq!(levels[1].reserved_stock, 4);
        assert_eq!(levels[1].available_stock, 6);
    }

    #[tokio::test]
    async fn test_publish_order_created() {
        let (service, event_bus) = create_service();
        let mut receiver = event_bus.subscribe();

        let ids = vec![Uuid::now_v7(), Uuid::now_v7()];
        service.publish_order_created(ids.clone());

        let event = receiver.recv().await.unwrap().unwrap();
        assert_eq!(event.kind, StockEventKind::OrderCreated);
        assert_eq!(event.variant_ids, ids);
    }
}
