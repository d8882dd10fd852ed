//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Reservation Service (hold lifecycle)
//! - Event Bus (process-local event distribution)
//! - Fan-out (subscriber connections, keep-alive)
//! - Sweeper (expiry + reconcile background passes)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start background tasks (fan-out pump, keep-alive, sweeper)
//! 4. Start API server
//! 5. Main event loop (log events)
//! 6. Graceful shutdown on SIGINT/SIGTERM

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use stockroom_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::EventBus;
use crate::fanout::Fanout;
use crate::reservation_service::ReservationService;
use crate::sweeper::Sweeper;

// =============================================================================
// Daemon
// =============================================================================

/// The main Stockroom daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Reservation service
    service: Arc<ReservationService<S>>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Subscriber fan-out registry
    fanout: Arc<Fanout>,
    /// Shutdown token for background tasks
    shutdown_token: CancellationToken,
}

impl Daemon<MemoryStore> {
    /// Create a new daemon backed by the in-memory store
    /// (testing/development, or production without a database).
    pub fn new_memory(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a new daemon around the given store.
    pub fn with_store(config: Config, store: Arc<S>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.events.bus_capacity));
        let ttl = ChronoDuration::seconds(config.reservation.ttl_secs as i64);
        let service = Arc::new(ReservationService::new(store, event_bus.clone(), ttl));
        let fanout = Arc::new(Fanout::new());

        Self {
            config,
            service,
            event_bus,
            fanout,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// The reservation service (for embedding and tests).
    pub fn service(&self) -> Arc<ReservationService<S>> {
        self.service.clone()
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT/SIGTERM).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting Stockroom daemon"
        );

        // 1. Background tasks
        self.start_fanout_pump();
        self.start_keepalive();
        let sweeper = Sweeper::new(
            self.service.clone(),
            self.config.reservation.clone(),
            self.shutdown_token.clone(),
        );
        let sweeper_handle = sweeper.spawn();

        // 2. API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Main event loop
        let mut events = self.event_bus.subscribe();
        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event_result) = events.recv() => {
                    match event_result {
                        Ok(event) => debug!(kind = ?event.kind, "Stock event"),
                        Err(lag_msg) => warn!(%lag_msg, "Event receiver lagged"),
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 4. Graceful shutdown
        self.shutdown_token.cancel();
        let _ = sweeper_handle.await;
        info!(
            subscribers = self.fanout.connection_count(),
            "Shutdown complete"
        );

        Ok(())
    }

    /// Start the API server.
    ///
    /// Public so tests and embedders can drive the HTTP surface without the
    /// full `run` loop. Binds the configured address (port 0 lets the OS
    /// pick) and serves on a spawned task.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            service: self.service.clone(),
            fanout: self.fanout.clone(),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Pump events from the process-local bus to subscriber connections.
    fn start_fanout_pump(&self) {
        let mut receiver = self.event_bus.subscribe();
        let fanout = self.fanout.clone();
        let token = self.shutdown_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(Ok(event)) => {
                            let delivered = fanout.broadcast(&event);
                            debug!(kind = ?event.kind, delivered, "Broadcast stock event");
                        }
                        Some(Err(lag_msg)) => warn!(%lag_msg, "Fan-out pump lagged"),
                        None => break,
                    },
                }
            }
        });
    }

    /// Periodic keep-alive so idle connections and proxies stay open.
    fn start_keepalive(&self) {
        let fanout = self.fanout.clone();
        let token = self.shutdown_token.clone();
        let period = Duration::from_secs(self.config.events.keepalive_interval_secs.max(1));

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        fanout.broadcast(&stockroom_domain::StockEvent::ping());
                    }
                }
            }
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_daemon_memory_creation() {
        let daemon = Daemon::new_memory(Config::test());

        let service = daemon.service();
        let levels = service.stock_levels().await.unwrap();
        assert!(levels.is_empty());
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_memory(Config::test());

        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_stock_endpoint() {
        let daemon = Daemon::new_memory(Config::test());
        let variant = daemon
            .service()
            .create_variant("shirt", 10)
            .await
            .unwrap();
        daemon
            .service()
            .reserve(variant.id, 4, Uuid::now_v7())
            .await
            .unwrap();

        let addr = daemon.start_api_server().await.unwrap();
        let client = reqwest::Client::new();
        let levels: serde_json::Value = client
            .get(format!("http://{}/stock", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(levels[0]["stock"], 10);
        assert_eq!(levels[0]["reservedStock"], 4);
        assert_eq!(levels[0]["availableStock"], 6);
    }
}
