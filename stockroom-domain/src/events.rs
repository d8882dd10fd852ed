//! Stock change events
//!
//! Immutable notifications produced by the reservation service and consumed
//! by the event fan-out. Never persisted.
//!
//! Wire shape (one JSON object per line on the subscriber stream):
//!
//! ```json
//! {"type":"STOCK_UPDATE","variantIds":["..."],"timestamp":"..."}
//! ```

use crate::entities::VariantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Kind
// =============================================================================

/// Kind of stock change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockEventKind {
    /// First event on every subscriber stream
    Connected,
    /// Periodic keep-alive so idle connections and proxies do not time out
    Ping,
    /// Availability changed for the listed variants
    StockUpdate,
    /// A new hold was placed
    ReservationCreated,
    /// An order was created by the checkout collaborator
    OrderCreated,
}

// =============================================================================
// Event
// =============================================================================

/// One reserved line item, attached to `ReservationCreated` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationLine {
    pub variant_id: VariantId,
    pub quantity: i64,
}

/// Immutable stock change event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockEvent {
    #[serde(rename = "type")]
    pub kind: StockEventKind,
    /// Affected variants; empty for pure liveness events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variant_ids: Vec<VariantId>,
    /// Reserved line items, present on `ReservationCreated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ReservationLine>>,
    pub timestamp: DateTime<Utc>,
}

impl StockEvent {
    fn new(kind: StockEventKind, variant_ids: Vec<VariantId>) -> Self {
        Self {
            kind,
            variant_ids,
            items: None,
            timestamp: Utc::now(),
        }
    }

    /// Stream-open acknowledgement.
    pub fn connected() -> Self {
        Self::new(StockEventKind::Connected, Vec::new())
    }

    /// Keep-alive.
    pub fn ping() -> Self {
        Self::new(StockEventKind::Ping, Vec::new())
    }

    /// Availability changed for the given variants.
    pub fn stock_update(variant_ids: Vec<VariantId>) -> Self {
        Self::new(StockEventKind::StockUpdate, variant_ids)
    }

    /// A hold was placed on `variant_id` for `quantity` units.
    pub fn reservation_created(variant_id: VariantId, quantity: i64) -> Self {
        let mut event = Self::new(StockEventKind::ReservationCreated, vec![variant_id]);
        event.items = Some(vec![ReservationLine {
            variant_id,
            quantity,
        }]);
        event
    }

    /// An order was created covering the given variants.
    pub fn order_created(variant_ids: Vec<VariantId>) -> Self {
        Self::new(StockEventKind::OrderCreated, variant_ids)
    }
}

// =============================================================================
// Tests
// =============================================================================
