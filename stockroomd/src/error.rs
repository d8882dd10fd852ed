//! Daemon error types.

use stockroom_domain::{DomainError, VariantId};
use stockroom_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain validation error (bad input, never retried)
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error (transient storage failure, propagated to the caller)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Not enough available stock for the requested quantity.
    ///
    /// Returned to the caller, never retried automatically; whether to
    /// re-prompt is a checkout decision.
    #[error("Insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: VariantId,
        requested: i64,
        available: i64,
    },

    /// Reservation not found
    #[error("Reservation not found: {0}")]
    ReservationNotFound(Uuid),

    /// Variant not found
    #[error("Variant not found: {0}")]
    VariantNotFound(Uuid),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
