//! HTTP API for the Stockroom daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Stock levels (per-variant stock/reserved/available)
//! - Reserve / release / commit holds
//! - Reconcile a variant's reserved counter
//! - Variant seeding and readback
//! - Long-lived newline-delimited JSON event stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use stockroom_domain::{Reservation, Variant};
use stockroom_store::Store;

use crate::error::DaemonError;
use crate::fanout::Fanout;
use crate::reservation_service::{ReservationService, StockLevel};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + 'static> {
    pub service: Arc<ReservationService<S>>,
    pub fanout: Arc<Fanout>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Request to reserve stock for an in-progress order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub variant_id: Uuid,
    pub quantity: i64,
    pub order_id: Uuid,
}

/// A reservation, as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    pub order_id: Uuid,
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Reservation> for ReservationResponse {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            variant_id: reservation.variant_id,
            quantity: reservation.quantity,
            order_id: reservation.order_id,
            status: reservation.status.to_string(),
            expires_at: reservation.expires_at,
        }
    }
}

/// Request to register a variant with the reservation core.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    pub name: String,
    pub stock: i64,
}

/// A variant, as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantResponse {
    pub id: Uuid,
    pub name: String,
    pub stock: i64,
    pub reserved: i64,
}

impl From<&Variant> for VariantResponse {
    fn from(variant: &Variant) -> Self {
        Self {
            id: variant.id,
            name: variant.name.clone(),
            stock: variant.stock,
            reserved: variant.reserved,
        }
    }
}

/// Reconcile response: the freshly recomputed counter.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub variant_id: Uuid,
    pub reserved: i64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S: Store + 'static>(state: Arc<ApiState<S>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stock", get(stock_handler))
        .route("/events", get(events_handler))
        .route("/reservations", post(reserve_handler))
        .route("/reservations/:id", delete(release_handler))
        .route("/reservations/:id/commit", post(commit_handler))
        .route("/reservations/:id/extend", post(extend_handler))
        .route("/variants", post(create_variant_handler))
        .route("/variants/:id", get(get_variant_handler))
        .route("/variants/:id/reconcile", post(reconcile_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Stock levels for every known variant, computed from live holds.
async fn stock_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<StockLevel>>, (StatusCode, Json<ErrorResponse>)> {
    let levels = state.service.stock_levels().await.map_err(to_error_response)?;
    Ok(Json(levels))
}

/// Reserve stock for an order.
async fn reserve_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let reservation = state
        .service
        .reserve(req.variant_id, req.quantity, req.order_id)
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json((&reservation).into())))
}

/// Release (cancel) a hold. Succeeds even when the hold is already terminal.
async fn release_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.service.release(id).await.map_err(to_error_response)?;
    Ok(StatusCode::OK)
}

/// Commit a hold: the owning order was paid/confirmed.
async fn commit_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state.service.commit(id).await.map_err(to_error_response)?;
    Ok(StatusCode::OK)
}

/// Extend a hold by one TTL. The response carries the hold's status, which
/// is terminal when the extension lost to a concurrent expiry or release.
async fn extend_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReservationResponse>, (StatusCode, Json<ErrorResponse>)> {
    let reservation = state.service.extend(id).await.map_err(to_error_response)?;
    Ok(Json((&reservation).into()))
}

/// Register a variant with the reservation core.
async fn create_variant_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Json(req): Json<CreateVariantRequest>,
) -> Result<(StatusCode, Json<VariantResponse>), (StatusCode, Json<ErrorResponse>)> {
    let variant = state
        .service
        .create_variant(req.name, req.stock)
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json((&variant).into())))
}

/// Read back a single variant (cached counter included).
async fn get_variant_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VariantResponse>, (StatusCode, Json<ErrorResponse>)> {
    let variant = state.service.get_variant(id).await.map_err(to_error_response)?;
    Ok(Json((&variant).into()))
}

/// Recompute a variant's reserved counter from the ledger.
async fn reconcile_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileResponse>, (StatusCode, Json<ErrorResponse>)> {
    let reserved = state.service.reconcile(id).await.map_err(to_error_response)?;
    Ok(Json(ReconcileResponse {
        variant_id: id,
        reserved,
    }))
}

/// Long-lived event stream: one JSON object per line.
///
/// The subscription deregisters itself when the client disconnects and the
/// stream is dropped, without waiting for the next keep-alive to fail.
async fn events_handler<S: Store + 'static>(
    State(state): State<Arc<ApiState<S>>>,
) -> impl IntoResponse {
    let mut subscription = state.fanout.subscribe();

    let stream = async_stream::stream! {
        while let Some(line) = subscription.recv().await {
            yield Ok::<_, Infallible>(line);
        }
    };

    (
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        DaemonError::InsufficientStock { .. } => StatusCode::CONFLICT,
        DaemonError::ReservationNotFound(_) | DaemonError::VariantNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        DaemonError::Store(_) | DaemonError::Config(_) | DaemonError::Shutdown => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_domain::DomainError;

    #[test]
    fn test_error_status_mapping() {
        let (status, _) = to_error_response(DaemonError::Domain(DomainError::InvalidQuantity(
            "0".to_string(),
        )));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = to_error_response(DaemonError::InsufficientStock {
            variant_id: Uuid::now_v7(),
            requested: 5,
            available: 3,
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = to_error_response(DaemonError::ReservationNotFound(Uuid::now_v7()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = to_error_response(DaemonError::Config("bad port".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.error.contains("bad port"));
    }
}
