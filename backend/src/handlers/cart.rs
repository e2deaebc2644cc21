//! HTTP handlers for cart endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::ShopperIdentity;
use crate::services::cart::{AddItemInput, Cart, CartView};
use crate::services::cart_validation::CartValidationReport;
use crate::services::reservation::Reservation;
use crate::AppState;

/// Get (or lazily create) the shopper's active cart with its items
pub async fn get_cart(
    State(state): State<AppState>,
    identity: ShopperIdentity,
) -> AppResult<Json<CartView>> {
    let service = state.carts();
    // A logged-in shopper's cart wins when both identities are present
    let (user_id, session_id) = match identity.user_id {
        Some(user_id) => (Some(user_id), None),
        None => (None, identity.session_id.as_deref()),
    };
    let cart = service.get_or_create(user_id, session_id).await?;
    let view = service.cart_view(cart.id).await?;
    Ok(Json(view))
}

/// Add an item to a cart
pub async fn add_item(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> AppResult<Json<CartView>> {
    let view = state.carts().add_item(cart_id, input).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemInput {
    pub quantity: i64,
}

/// Change a cart line's quantity (zero or negative removes the line)
pub async fn update_item(
    State(state): State<AppState>,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateItemInput>,
) -> AppResult<Json<CartView>> {
    let view = state
        .carts()
        .update_item(cart_id, item_id, input.quantity)
        .await?;
    Ok(Json(view))
}

/// Remove a line from a cart
pub async fn remove_item(
    State(state): State<AppState>,
    Path((cart_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<CartView>> {
    let view = state.carts().remove_item(cart_id, item_id).await?;
    Ok(Json(view))
}

/// Empty a cart
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<CartView>> {
    let view = state.carts().clear(cart_id).await?;
    Ok(Json(view))
}

/// Revalidate a cart against the live catalog and current availability
pub async fn validate_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<CartValidationReport>> {
    let report = state.cart_validation().validate_cart(cart_id).await?;
    Ok(Json(report))
}

/// Merge the shopper's guest cart into their user cart at login. Requires
/// both identities on the request.
pub async fn merge_carts(
    State(state): State<AppState>,
    identity: ShopperIdentity,
) -> AppResult<Json<Cart>> {
    let (user_id, session_id) = match (identity.user_id, identity.session_id) {
        (Some(user_id), Some(session_id)) => (user_id, session_id),
        _ => {
            return Err(AppError::Validation {
                field: "identity".to_string(),
                message: "Merging requires both x-user-id and x-session-id".to_string(),
            });
        }
    };
    let cart = state.cart_merge().merge_on_login(user_id, &session_id).await?;
    Ok(Json(cart))
}

#[derive(Debug, serde::Serialize)]
pub struct ReleasedResponse {
    pub released: u64,
}

/// Release every hold a cart has without touching its lines (abandonment
/// cleanup)
pub async fn release_cart_reservations(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<ReleasedResponse>> {
    let released = state.reservations().release_by_cart(cart_id).await?;
    Ok(Json(ReleasedResponse { released }))
}

/// Active reservations held by a cart
pub async fn list_cart_reservations(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> AppResult<Json<Vec<Reservation>>> {
    let reservations = state.reservations().list_for_cart(cart_id).await?;
    Ok(Json(reservations))
}
