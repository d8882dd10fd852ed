//! Stockroom Daemon Library
//!
//! Runtime orchestrator for the Stockroom reservation core.
//!
//! # Architecture
//!
//! ```text
//! HTTP API → Reservation Service → Store (ledger + variants)
//!                  │
//!             Event Bus (stock events)
//!                  │
//!             Fan-out ──→ subscriber connections (NDJSON)
//!                  ↑
//!             Sweeper (expiry + reconcile)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Reservation Service**: Hold lifecycle (reserve, release, commit, expire)
//! - **Sweeper**: Background expiry and counter reconcile passes
//! - **Event Bus**: Internal communication (service → fan-out)
//! - **Fan-out**: Live subscriber connections and broadcast
//! - **API**: HTTP endpoints (stock, reservations, events)
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use stockroomd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod fanout;
pub mod reservation_service;
pub mod sweeper;

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, EventConfig, ReservationConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{EventBus, EventReceiver};
pub use fanout::{ConnectionId, Fanout, Subscription};
pub use reservation_service::{ReservationService, StockLevel};
pub use sweeper::Sweeper;
