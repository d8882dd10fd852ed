//! Availability calculator
//!
//! Pure functions from on-hand stock and the live hold sum to availability.
//! No side effects; safe to call concurrently from any number of callers.
//!
//! The live reserved sum is the sum of quantities of Active reservations for
//! a variant, computed from the ledger. The denormalized counter on the
//! variant is a cache of the same value and must not be fed in here when an
//! authoritative answer is required.

/// Available quantity: `max(0, stock - live_reserved)`.
///
/// Never negative, even when the cached counter has drifted above stock.
pub fn available(stock: i64, live_reserved: i64) -> i64 {
    (stock - live_reserved).max(0)
}

/// Whether `requested` units can be reserved given current availability.
pub fn can_reserve(stock: i64, live_reserved: i64, requested: i64) -> bool {
    requested <= available(stock, live_reserved)
}

// =============================================================================
// Tests
// =============================================================================
