//! Guest-to-user cart reconciliation at login
//!
//! Four cases over (user cart, session cart) existence. The interesting one
//! is the real merge: combined line quantities are clamped to what the
//! stock ceiling leaves after other carts' holds, lines that clamp to zero
//! are dropped, and the session cart is torn down, all in one transaction.

use sqlx::PgPool;
use uuid::Uuid;

use shared::merged_line_quantity;

use crate::error::{AppError, AppResult};
use crate::services::cart::{
    recompute_totals_in, Cart, CartItem, CartService, CART_COLUMNS, CART_ITEM_COLUMNS,
};
use crate::services::reservation::{active_hold_sum, ReservationService};
use crate::services::stock::lock_stockable;

/// Cart merge service
#[derive(Clone)]
pub struct CartMergeService {
    db: PgPool,
    carts: CartService,
    reservations: ReservationService,
}

impl CartMergeService {
    /// Create a new CartMergeService instance
    pub fn new(db: PgPool, carts: CartService, reservations: ReservationService) -> Self {
        Self {
            db,
            carts,
            reservations,
        }
    }

    /// Reconcile the session (guest) cart with the user's cart at login and
    /// return the cart the user continues shopping with
    pub async fn merge_on_login(&self, user_id: Uuid, session_id: &str) -> AppResult<Cart> {
        let user_cart = self.carts.find_active(Some(user_id), None).await?;
        let session_cart = self.carts.find_active(None, Some(session_id)).await?;

        match (user_cart, session_cart) {
            (None, None) => self.carts.get_or_create(Some(user_id), None).await,
            (Some(user_cart), None) => Ok(user_cart),
            (None, Some(session_cart)) => self.rekey(session_cart.id, user_id).await,
            (Some(user_cart), Some(session_cart)) => {
                self.merge(user_cart, session_cart).await
            }
        }
    }

    /// Transfer ownership of a session cart to the user. Lines and
    /// reservations are untouched.
    async fn rekey(&self, cart_id: Uuid, user_id: Uuid) -> AppResult<Cart> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            "UPDATE carts SET user_id = $1, session_id = NULL, updated_at = now() \
             WHERE id = $2 RETURNING {}",
            CART_COLUMNS
        ))
        .bind(user_id)
        .bind(cart_id)
        .fetch_one(&self.db)
        .await?;
        Ok(cart)
    }

    /// Fold every session line into the user cart under the stock ceiling,
    /// then delete the session cart. Atomic: a crash mid-merge rolls the
    /// whole thing back.
    async fn merge(&self, user_cart: Cart, session_cart: Cart) -> AppResult<Cart> {
        let mut tx = self.db.begin().await?;

        let session_items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE cart_id = $1 ORDER BY created_at FOR UPDATE",
            CART_ITEM_COLUMNS
        ))
        .bind(session_cart.id)
        .fetch_all(&mut *tx)
        .await?;

        for session_item in &session_items {
            let user_item = sqlx::query_as::<_, CartItem>(&format!(
                "SELECT {} FROM cart_items WHERE cart_id = $1 AND product_id = $2 \
                 AND variant_id IS NOT DISTINCT FROM $3 FOR UPDATE",
                CART_ITEM_COLUMNS
            ))
            .bind(user_cart.id)
            .bind(session_item.product_id)
            .bind(session_item.variant_id)
            .fetch_optional(&mut *tx)
            .await?;

            let stockable = session_item.stockable_ref();
            let stock_row = match lock_stockable(&mut tx, stockable).await {
                Ok(row) => row,
                // Product vanished since the session cart was filled; the
                // line is dropped with the rest of the session cart.
                Err(AppError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            let user_qty = user_item.as_ref().map(|i| i.quantity).unwrap_or(0);
            let held_by_others =
                active_hold_sum(&mut *tx, stockable, &[user_cart.id, session_cart.id]).await?;

            let target = if stock_row.manage_stock {
                merged_line_quantity(
                    user_qty,
                    session_item.quantity,
                    stock_row.stock_quantity,
                    held_by_others,
                )
            } else {
                user_qty + session_item.quantity
            };

            if target <= 0 {
                // Sold out between the two carts' activity; drop silently.
                if let Some(user_item) = &user_item {
                    self.reservations
                        .release_pair_in(&mut tx, stockable, user_cart.id)
                        .await?;
                    sqlx::query("DELETE FROM cart_items WHERE id = $1")
                        .bind(user_item.id)
                        .execute(&mut *tx)
                        .await?;
                }
                continue;
            }

            match &user_item {
                Some(user_item) => {
                    sqlx::query(
                        "UPDATE cart_items SET quantity = $1, updated_at = now() WHERE id = $2",
                    )
                    .bind(target)
                    .bind(user_item.id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO cart_items (cart_id, product_id, variant_id, quantity, unit_price, sale_price) \
                         VALUES ($1, $2, $3, $4, $5, $6)",
                    )
                    .bind(user_cart.id)
                    .bind(session_item.product_id)
                    .bind(session_item.variant_id)
                    .bind(target)
                    .bind(session_item.unit_price)
                    .bind(session_item.sale_price)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            // Already clamped under the same lock, so no admission re-check
            self.reservations
                .apply_hold_in(&mut tx, stockable, user_cart.id, target, false)
                .await?;
        }

        self.reservations
            .release_by_cart_in(&mut tx, session_cart.id)
            .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(session_cart.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(session_cart.id)
            .execute(&mut *tx)
            .await?;

        recompute_totals_in(&mut tx, user_cart.id).await?;
        tx.commit().await?;

        self.carts.find_cart(user_cart.id).await
    }
}
