//! Route definitions for the storefront stock and cart API

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Cart management
        .nest("/carts", cart_routes())
        // Stock adjustment, availability, and ledger
        .nest("/stock", stock_routes())
        // Reservation lifecycle
        .nest("/reservations", reservation_routes())
}

/// Cart routes
fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::get_cart))
        .route("/merge", post(handlers::merge_carts))
        .route("/:cart_id/items", post(handlers::add_item))
        .route("/:cart_id/items/:item_id", put(handlers::update_item))
        .route("/:cart_id/items/:item_id", delete(handlers::remove_item))
        .route("/:cart_id/clear", post(handlers::clear_cart))
        .route("/:cart_id/validate", post(handlers::validate_cart))
        .route("/:cart_id/reservations", get(handlers::list_cart_reservations))
        .route("/:cart_id/reservations", delete(handlers::release_cart_reservations))
}

/// Stock routes
fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(handlers::list_low_stock_alerts))
        .route("/:kind/:id/adjust", post(handlers::adjust_stock))
        .route("/:kind/:id/sale", post(handlers::record_sale))
        .route("/:kind/:id/refund", post(handlers::record_refund))
        .route("/:kind/:id/availability", get(handlers::get_availability))
        .route("/:kind/:id/ledger", get(handlers::list_ledger))
}

/// Reservation routes
fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_reservation))
        .route("/purge-expired", post(handlers::purge_expired_reservations))
        .route("/:reservation_id", delete(handlers::release_reservation))
        .route("/:reservation_id/convert", post(handlers::convert_reservation))
        .route("/:reservation_id/extend", post(handlers::extend_reservation))
}
