//! Stockroom Store
//!
//! The reservation ledger: durable storage and querying of reservation rows
//! and variant stock counters.
//!
//! # Architecture
//!
//! - `repository`: storage traits (ports) the daemon programs against
//! - `memory`: in-memory implementation for tests and development
//! - `postgres`: PostgreSQL implementation (feature `postgres`)
//!
//! The ledger is the single source of truth for live holds. The denormalized
//! reserved counter on the variant row is a cache maintained by the
//! reservation service and repaired by reconcile.

#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod repository;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use repository::{ReservationRepository, Store, VariantRepository};

#[cfg(feature = "postgres")]
pub use postgres::PgStore;
