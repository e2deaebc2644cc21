//! Pre-checkout cart reconciliation
//!
//! Re-checks every line against the live catalog and current availability,
//! removes or clamps what no longer holds, refreshes drifted prices, and
//! re-evaluates the coupon against the recalculated subtotal. One
//! transaction; totals are recomputed once at the end.

use chrono::Utc;
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    available_quantity, classify_price_drift, CartAlert, CouponRejection, RemovalReason,
};

use crate::error::{AppError, AppResult};
use crate::services::cart::{
    find_coupon_in, recompute_totals_in, Cart, CartItem, CART_COLUMNS, CART_ITEM_COLUMNS,
};
use crate::services::catalog::CatalogService;
use crate::services::reservation::{active_hold_sum, ReservationService};
use crate::services::stock::lock_stockable;

/// Cart validation service
#[derive(Clone)]
pub struct CartValidationService {
    db: PgPool,
    catalog: CatalogService,
    reservations: ReservationService,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Serialize, Default)]
pub struct CartValidationReport {
    pub alerts: Vec<CartAlert>,
    pub removed_items: Vec<Uuid>,
    pub updated_items: Vec<Uuid>,
}

impl CartValidationService {
    /// Create a new CartValidationService instance
    pub fn new(db: PgPool, catalog: CatalogService, reservations: ReservationService) -> Self {
        Self {
            db,
            catalog,
            reservations,
        }
    }

    /// Run the full reconciliation pass over a cart
    pub async fn validate_cart(&self, cart_id: Uuid) -> AppResult<CartValidationReport> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            "SELECT {} FROM carts WHERE id = $1",
            CART_COLUMNS
        ))
        .bind(cart_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart".to_string()))?;

        let mut report = CartValidationReport::default();
        let mut tx = self.db.begin().await?;

        let items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE cart_id = $1 ORDER BY created_at FOR UPDATE",
            CART_ITEM_COLUMNS
        ))
        .bind(cart.id)
        .fetch_all(&mut *tx)
        .await?;

        for item in &items {
            self.validate_item(&mut tx, &cart, item, &mut report).await?;
        }

        self.validate_coupon(&mut tx, &cart, &mut report).await?;

        recompute_totals_in(&mut tx, cart.id).await?;
        tx.commit().await?;

        Ok(report)
    }

    /// Per-item policy, evaluated in priority order; the first failing rule
    /// decides the item's fate
    async fn validate_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
        item: &CartItem,
        report: &mut CartValidationReport,
    ) -> AppResult<()> {
        // 1. Product soft-deleted or missing
        let product = match self.catalog.find_product_any(item.product_id).await? {
            Some(product) if !product.is_deleted() => product,
            _ => {
                return self
                    .remove_item(tx, cart, item, "This item".to_string(), RemovalReason::ProductUnavailable, report)
                    .await;
            }
        };

        // 2. Product no longer purchasable
        if !product.product_status().is_purchasable() {
            return self
                .remove_item(tx, cart, item, product.name, RemovalReason::ProductUnavailable, report)
                .await;
        }

        // 3. Referenced variant gone
        let variant = match item.variant_id {
            Some(variant_id) => {
                match self.catalog.find_variant_any(product.id, variant_id).await? {
                    Some(variant) if !variant.is_deleted() => Some(variant),
                    _ => {
                        return self
                            .remove_item(tx, cart, item, product.name, RemovalReason::VariantMissing, report)
                            .await;
                    }
                }
            }
            None => None,
        };

        // 4/5. Availability, excluding this cart's own hold
        let stockable = item.stockable_ref();
        let stock_row = lock_stockable(tx, stockable).await?;
        if stock_row.manage_stock {
            let held_by_others = active_hold_sum(&mut **tx, stockable, &[cart.id]).await?;
            let available =
                available_quantity(stock_row.stock_quantity, true, held_by_others);

            if available == 0 {
                return self
                    .remove_item(tx, cart, item, product.name, RemovalReason::OutOfStock, report)
                    .await;
            }

            if item.quantity > available {
                sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = now() WHERE id = $2")
                    .bind(available)
                    .bind(item.id)
                    .execute(&mut **tx)
                    .await?;
                self.reservations
                    .apply_hold_in(tx, stockable, cart.id, available, false)
                    .await?;
                report.alerts.push(CartAlert::QuantityReduced {
                    name: product.name.clone(),
                    requested: item.quantity,
                    available,
                });
                report.updated_items.push(item.id);
            }
        }

        // 6. Price drift against the live catalog
        let stored = item.price_snapshot();
        let live = CatalogService::live_price(&product, variant.as_ref());
        if let Some(drift) = classify_price_drift(stored, live) {
            sqlx::query(
                "UPDATE cart_items SET unit_price = $1, sale_price = $2, updated_at = now() WHERE id = $3",
            )
            .bind(live.unit_price.cents())
            .bind(live.sale_price.map(|p| p.cents()))
            .bind(item.id)
            .execute(&mut **tx)
            .await?;
            report.alerts.push(CartAlert::PriceChanged {
                name: product.name.clone(),
                old_price: stored.effective(),
                new_price: live.effective(),
                drift,
            });
            if !report.updated_items.contains(&item.id) {
                report.updated_items.push(item.id);
            }
        }

        Ok(())
    }

    async fn remove_item(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
        item: &CartItem,
        name: String,
        reason: RemovalReason,
        report: &mut CartValidationReport,
    ) -> AppResult<()> {
        self.reservations
            .release_pair_in(tx, item.stockable_ref(), cart.id)
            .await?;
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item.id)
            .execute(&mut **tx)
            .await?;
        report.alerts.push(CartAlert::ItemRemoved { name, reason });
        report.removed_items.push(item.id);
        Ok(())
    }

    /// Coupon policy, evaluated after the item pass against the
    /// recalculated subtotal
    async fn validate_coupon(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: &Cart,
        report: &mut CartValidationReport,
    ) -> AppResult<()> {
        let Some(coupon_id) = cart.coupon_id else {
            return Ok(());
        };

        // Eligibility is judged against the subtotal as it stands after the
        // item pass, not the stale stored one
        let subtotal = recompute_totals_in(tx, cart.id).await?.subtotal;

        let coupon = find_coupon_in(tx, coupon_id).await?;
        let rejection = match &coupon {
            Some(coupon) => coupon.terms().eligibility(Utc::now(), subtotal).err(),
            None => Some(CouponRejection::Deactivated),
        };

        if let Some(reason) = rejection {
            sqlx::query("UPDATE carts SET coupon_id = NULL, updated_at = now() WHERE id = $1")
                .bind(cart.id)
                .execute(&mut **tx)
                .await?;
            report.alerts.push(CartAlert::CouponRemoved {
                code: coupon.map(|c| c.code).unwrap_or_else(|| "unknown".to_string()),
                reason,
            });
        }

        Ok(())
    }
}
