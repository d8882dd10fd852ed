//! Stockroom Domain
//!
//! Core domain types for inventory stock reservation:
//! - `Variant`: a sellable product variant with on-hand stock and a
//!   denormalized reserved counter
//! - `Reservation`: a temporary hold on variant stock, tied to an order
//! - `availability`: pure availability math (stock minus live holds)
//! - `StockEvent`: immutable stock-change notifications for subscribers
//!
//! All validation happens at construction time; entities that exist are
//! valid by construction.

#![warn(clippy::all)]

pub mod availability;
pub mod entities;
pub mod events;

pub use availability::{available, can_reserve};
pub use entities::{
    DomainError, OrderId, Reservation, ReservationId, ReservationStatus, Variant, VariantId,
};
pub use events::{ReservationLine, StockEvent, StockEventKind};
