//! Expiry sweeper: background pass over stale holds.
//!
//! Runs on its own timer-driven task, concurrently with request traffic:
//! - every sweep period, expires Active holds whose TTL elapsed
//! - on a slower schedule, reconciles every variant's reserved counter
//!   against the ledger, so drift repair is a scheduled operation rather
//!   than an emergency manual script
//!
//! Failures are logged and the loop continues; a bad tick never stops the
//! sweeper.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stockroom_store::Store;

use crate::config::ReservationConfig;
use crate::reservation_service::ReservationService;

/// Background sweeper for expired holds and counter drift.
pub struct Sweeper<S: Store + 'static> {
    service: Arc<ReservationService<S>>,
    config: ReservationConfig,
    shutdown_token: CancellationToken,
}

impl<S: Store + 'static> Sweeper<S> {
    /// Create a new sweeper.
    pub fn new(
        service: Arc<ReservationService<S>>,
        config: ReservationConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            service,
            config,
            shutdown_token,
        }
    }

    /// Spawn the sweep loop on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let mut sweep_tick =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
        // First interval tick fires immediately; skip the startup sweep
        sweep_tick.tick().await;

        let reconcile_enabled = self.config.reconcile_interval_secs > 0;
        let mut reconcile_tick = tokio::time::interval(Duration::from_secs(
            self.config.reconcile_interval_secs.max(1),
        ));
        reconcile_tick.tick().await;

        info!(
            sweep_interval_secs = self.config.sweep_interval_secs,
            reconcile_interval_secs = self.config.reconcile_interval_secs,
            "Sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    info!("Sweeper shutting down");
                    break;
                }

                _ = sweep_tick.tick() => {
                    match self.service.sweep_expired(Utc::now()).await {
                        Ok(0) => debug!("Sweep found no expired holds"),
                        Ok(count) => info!(count, "Sweep expired stale holds"),
                        Err(e) => warn!(error = %e, "Sweep failed, will retry next period"),
                    }
                }

                _ = reconcile_tick.tick(), if reconcile_enabled => {
                    self.reconcile_all().await;
                }
            }
        }
    }

    /// Reconcile every known variant, skipping individual failures.
    async fn reconcile_all(&self) {
        let variant_ids = match self.service.variant_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Reconcile pass could not list variants");
                return;
            }
        };

        let mut repaired = 0;
        for variant_id in variant_ids {
            match self.service.reconcile(variant_id).await {
                Ok(_) => repaired += 1,
                Err(e) => warn!(%variant_id, error = %e, "Reconcile failed for variant, skipping"),
            }
        }
        debug!(repaired, "Reconcile pass complete");
    }
}

// =============================================================================
// Tests
// =============================================================================
