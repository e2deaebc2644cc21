//! HTTP handlers for stock, ledger, and reservation endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{MovementKind, PaginatedResponse, Pagination, StockableRef, StockableType};

use crate::error::{AppError, AppResult};
use crate::services::alerts::LowStockAlert;
use crate::services::reservation::Reservation;
use crate::services::stock::LedgerEntry;
use crate::AppState;

/// Parse the `:kind/:id` path segments into a stockable reference
fn stockable_from_path(kind: &str, id: Uuid) -> AppResult<StockableRef> {
    let kind = StockableType::from_str(kind).ok_or_else(|| AppError::Validation {
        field: "kind".to_string(),
        message: "Stockable kind must be 'product' or 'variant'".to_string(),
    })?;
    Ok(StockableRef { kind, id })
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockInput {
    pub delta: i64,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
}

/// Manually adjust a stockable's on-hand quantity (inventory correction,
/// restock, damage write-off)
pub async fn adjust_stock(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<AdjustStockInput>,
) -> AppResult<Json<LedgerEntry>> {
    let stockable = stockable_from_path(&kind, id)?;
    let movement = if input.delta >= 0 {
        MovementKind::ManualEntry
    } else {
        MovementKind::ManualExit
    };
    let entry = state
        .stock()
        .adjust(stockable, input.delta, movement, input.note, None, input.actor_id)
        .await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct OrderMovementInput {
    pub quantity: i64,
    pub order_id: Option<Uuid>,
}

/// Record a completed sale against a stockable (order flow outside the
/// reservation path)
pub async fn record_sale(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<OrderMovementInput>,
) -> AppResult<Json<LedgerEntry>> {
    let stockable = stockable_from_path(&kind, id)?;
    let entry = state
        .stock()
        .record_sale(stockable, input.quantity, input.order_id)
        .await?;
    Ok(Json(entry))
}

/// Return sold quantity to stock after a refund
pub async fn record_refund(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(input): Json<OrderMovementInput>,
) -> AppResult<Json<LedgerEntry>> {
    let stockable = stockable_from_path(&kind, id)?;
    let entry = state
        .stock()
        .refund(stockable, input.quantity, input.order_id)
        .await?;
    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub stockable: StockableRef,
    pub available: i64,
}

/// Quantity currently available for new reservations
pub async fn get_availability(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> AppResult<Json<AvailabilityResponse>> {
    let stockable = stockable_from_path(&kind, id)?;
    let available = state.reservations().available(stockable).await?;
    Ok(Json(AvailabilityResponse {
        stockable,
        available,
    }))
}

/// Movement history for a stockable, newest first
pub async fn list_ledger(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, Uuid)>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<LedgerEntry>>> {
    let stockable = stockable_from_path(&kind, id)?;
    let page = state.stock().list_ledger(stockable, pagination).await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct ReserveInput {
    pub stockable_type: StockableType,
    pub stockable_id: Uuid,
    pub cart_id: Uuid,
    pub quantity: i64,
}

/// Create or update a cart's hold on a stockable
pub async fn create_reservation(
    State(state): State<AppState>,
    Json(input): Json<ReserveInput>,
) -> AppResult<Json<Reservation>> {
    let stockable = StockableRef {
        kind: input.stockable_type,
        id: input.stockable_id,
    };
    let reservation = state
        .reservations()
        .reserve(stockable, input.quantity, input.cart_id)
        .await?;
    Ok(Json(reservation))
}

/// Release a reservation. Idempotent.
pub async fn release_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<()>> {
    state.reservations().release(reservation_id).await?;
    Ok(Json(()))
}

#[derive(Debug, Deserialize, Default)]
pub struct ConvertInput {
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub converted: bool,
    pub entry: Option<LedgerEntry>,
}

/// Convert a reservation into a durable stock deduction at checkout.
/// Idempotent: a missing, expired, or already converted reservation reports
/// `converted: false`.
pub async fn convert_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
    Json(input): Json<ConvertInput>,
) -> AppResult<Json<ConvertResponse>> {
    let entry = state
        .reservations()
        .convert_to_sale(reservation_id, input.order_id)
        .await?;
    Ok(Json(ConvertResponse {
        converted: entry.is_some(),
        entry,
    }))
}

/// Extend a reservation by one TTL from now
pub async fn extend_reservation(
    State(state): State<AppState>,
    Path(reservation_id): Path<Uuid>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.reservations().extend(reservation_id).await?;
    Ok(Json(reservation))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

/// Sweep expired reservations
pub async fn purge_expired_reservations(
    State(state): State<AppState>,
) -> AppResult<Json<PurgeResponse>> {
    let purged = state.reservations().purge_expired().await?;
    Ok(Json(PurgeResponse { purged }))
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    pub limit: Option<i64>,
}

/// Recent low-stock alerts
pub async fn list_low_stock_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> AppResult<Json<Vec<LowStockAlert>>> {
    let alerts = state.alerts().list_recent(query.limit.unwrap_or(50)).await?;
    Ok(Json(alerts))
}
