//! Cart line item operations and derived totals
//!
//! Every mutation keeps the line quantity, the cart's reservation, and the
//! cart totals in step inside one transaction; a partially applied cart
//! write is never observable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    compute_totals, validate_cart_owner, validate_quantity, CartTotals, CouponDiscount,
    CouponTerms, Money, PriceSnapshot, Stockable, StockableRef,
};

use crate::error::{AppError, AppResult};
use crate::services::catalog::CatalogService;
use crate::services::reservation::ReservationService;

/// Cart service for line item management
#[derive(Clone)]
pub struct CartService {
    db: PgPool,
    catalog: CatalogService,
    reservations: ReservationService,
}

/// Cart row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub status: String,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub shipping_address: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cart line item row. Prices are snapshots taken when the line was created
/// or last revalidated.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i64,
    pub unit_price: i64,
    pub sale_price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn stockable_ref(&self) -> StockableRef {
        match self.variant_id {
            Some(variant_id) => StockableRef::variant(variant_id),
            None => StockableRef::product(self.product_id),
        }
    }

    pub fn price_snapshot(&self) -> PriceSnapshot {
        PriceSnapshot::new(Money(self.unit_price), self.sale_price.map(Money))
    }
}

/// A cart with its line items
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i64,
}

/// Coupon row as read for totals and validation
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub active: bool,
    pub discount_type: String,
    pub discount_value: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub minimum_subtotal: Option<i64>,
}

impl Coupon {
    pub fn terms(&self) -> CouponTerms {
        CouponTerms {
            active: self.active,
            expires_at: self.expires_at,
            usage_limit: self.usage_limit,
            usage_count: self.usage_count,
            minimum_subtotal: self.minimum_subtotal.map(Money),
        }
    }

    pub fn discount(&self) -> CouponDiscount {
        match self.discount_type.as_str() {
            "percent" => CouponDiscount::Percent(self.discount_value),
            _ => CouponDiscount::Fixed(Money(self.discount_value)),
        }
    }
}

pub(crate) const CART_COLUMNS: &str = "id, user_id, session_id, status, subtotal, discount, total, \
     shipping_address, coupon_id, last_activity_at, created_at, updated_at";

pub(crate) const CART_ITEM_COLUMNS: &str =
    "id, cart_id, product_id, variant_id, quantity, unit_price, sale_price, created_at, updated_at";

const COUPON_COLUMNS: &str = "id, code, active, discount_type, discount_value, expires_at, \
     usage_limit, usage_count, minimum_subtotal";

/// Load a coupon inside a transaction
pub(crate) async fn find_coupon_in(
    tx: &mut Transaction<'_, Postgres>,
    coupon_id: Uuid,
) -> AppResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {} FROM coupons WHERE id = $1",
        COUPON_COLUMNS
    ))
    .bind(coupon_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(coupon)
}

/// Recompute and persist a cart's derived totals from its current lines and
/// coupon, bumping last activity. The one and only way totals are written.
pub(crate) async fn recompute_totals_in(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
) -> AppResult<CartTotals> {
    let lines: Vec<(i64, i64, Option<i64>)> = sqlx::query_as(
        "SELECT quantity, unit_price, sale_price FROM cart_items WHERE cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut **tx)
    .await?;

    let priced: Vec<(i64, Money)> = lines
        .iter()
        .map(|(qty, unit, sale)| (*qty, PriceSnapshot::new(Money(*unit), sale.map(Money)).effective()))
        .collect();
    let subtotal_only = compute_totals(&priced, Money::ZERO).subtotal;

    let coupon_id: Option<Uuid> =
        sqlx::query_scalar("SELECT coupon_id FROM carts WHERE id = $1")
            .bind(cart_id)
            .fetch_one(&mut **tx)
            .await?;

    let discount = match coupon_id {
        Some(id) => match find_coupon_in(tx, id).await? {
            Some(coupon) => coupon.discount().amount(subtotal_only),
            None => Money::ZERO,
        },
        None => Money::ZERO,
    };

    let totals = compute_totals(&priced, discount);

    sqlx::query(
        "UPDATE carts SET subtotal = $1, discount = $2, total = $3, \
         last_activity_at = now(), updated_at = now() WHERE id = $4",
    )
    .bind(totals.subtotal.cents())
    .bind(totals.discount.cents())
    .bind(totals.total.cents())
    .bind(cart_id)
    .execute(&mut **tx)
    .await?;

    Ok(totals)
}

impl CartService {
    /// Create a new CartService instance
    pub fn new(db: PgPool, catalog: CatalogService, reservations: ReservationService) -> Self {
        Self {
            db,
            catalog,
            reservations,
        }
    }

    /// Find the active cart for an owner, creating one lazily
    pub async fn get_or_create(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
    ) -> AppResult<Cart> {
        validate_cart_owner(user_id, session_id).map_err(|message| AppError::Validation {
            field: "owner".to_string(),
            message: message.to_string(),
        })?;

        if let Some(cart) = self.find_active(user_id, session_id).await? {
            return Ok(cart);
        }

        match sqlx::query_as::<_, Cart>(&format!(
            "INSERT INTO carts (user_id, session_id) VALUES ($1, $2) RETURNING {}",
            CART_COLUMNS
        ))
        .bind(user_id)
        .bind(session_id)
        .fetch_one(&self.db)
        .await
        {
            Ok(cart) => Ok(cart),
            // Lost a create race against the one-active-cart-per-owner
            // index; the winner's cart is the one this owner wants
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => self
                .find_active(user_id, session_id)
                .await?
                .ok_or_else(|| {
                    AppError::Conflict(
                        "An active cart already exists for this owner".to_string(),
                    )
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the active cart for an owner without creating one
    pub async fn find_active(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
    ) -> AppResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>(&format!(
            "SELECT {} FROM carts WHERE status = 'active' \
             AND ($1::uuid IS NOT NULL AND user_id = $1 \
                  OR $2::text IS NOT NULL AND session_id = $2)",
            CART_COLUMNS
        ))
        .bind(user_id)
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(cart)
    }

    /// Load a cart by id
    pub async fn find_cart(&self, cart_id: Uuid) -> AppResult<Cart> {
        sqlx::query_as::<_, Cart>(&format!("SELECT {} FROM carts WHERE id = $1", CART_COLUMNS))
            .bind(cart_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Cart".to_string()))
    }

    /// Load a cart with its line items
    pub async fn cart_view(&self, cart_id: Uuid) -> AppResult<CartView> {
        let cart = self.find_cart(cart_id).await?;
        let items = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE cart_id = $1 ORDER BY created_at",
            CART_ITEM_COLUMNS
        ))
        .bind(cart_id)
        .fetch_all(&self.db)
        .await?;
        Ok(CartView { cart, items })
    }

    /// Add a product (or variant) to a cart. An existing line for the same
    /// product and variant has its quantity increased instead of a duplicate
    /// row appearing.
    pub async fn add_item(&self, cart_id: Uuid, input: AddItemInput) -> AppResult<CartView> {
        validate_quantity(input.quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        let cart = self.find_cart(cart_id).await?;
        let product = self.catalog.purchasable_product(input.product_id).await?;
        let variant = match input.variant_id {
            Some(variant_id) => Some(
                self.catalog
                    .find_variant(product.id, variant_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Product variant".to_string()))?,
            ),
            None => None,
        };

        let stockable = variant
            .as_ref()
            .map(|v| v.stockable_ref())
            .unwrap_or_else(|| product.stockable_ref());
        let price = CatalogService::live_price(&product, variant.as_ref());

        let mut tx = self.db.begin().await?;

        let existing = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE cart_id = $1 AND product_id = $2 \
             AND variant_id IS NOT DISTINCT FROM $3 FOR UPDATE",
            CART_ITEM_COLUMNS
        ))
        .bind(cart.id)
        .bind(product.id)
        .bind(input.variant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let final_quantity = existing.as_ref().map(|i| i.quantity).unwrap_or(0) + input.quantity;

        // Admission check happens here, under the stockable row lock, with
        // this cart's own hold excluded from the reserved sum.
        self.reservations
            .apply_hold_in(&mut tx, stockable, cart.id, final_quantity, true)
            .await?;

        match &existing {
            Some(item) => {
                sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = now() WHERE id = $2")
                    .bind(final_quantity)
                    .bind(item.id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO cart_items (cart_id, product_id, variant_id, quantity, unit_price, sale_price) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(cart.id)
                .bind(product.id)
                .bind(input.variant_id)
                .bind(final_quantity)
                .bind(price.unit_price.cents())
                .bind(price.sale_price.map(|p| p.cents()))
                .execute(&mut *tx)
                .await?;
            }
        }

        recompute_totals_in(&mut tx, cart.id).await?;
        tx.commit().await?;

        self.cart_view(cart.id).await
    }

    /// Change a line's quantity. Zero or negative routes to removal; only
    /// the increase direction is checked against availability.
    pub async fn update_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        new_quantity: i64,
    ) -> AppResult<CartView> {
        if new_quantity <= 0 {
            return self.remove_item(cart_id, item_id).await;
        }

        let mut tx = self.db.begin().await?;

        let item = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE id = $1 AND cart_id = $2 FOR UPDATE",
            CART_ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item".to_string()))?;

        let enforce_ceiling = new_quantity > item.quantity;
        self.reservations
            .apply_hold_in(&mut tx, item.stockable_ref(), cart_id, new_quantity, enforce_ceiling)
            .await?;

        sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = now() WHERE id = $2")
            .bind(new_quantity)
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        recompute_totals_in(&mut tx, cart_id).await?;
        tx.commit().await?;

        self.cart_view(cart_id).await
    }

    /// Remove a line: release its reservation, delete it, recompute totals
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> AppResult<CartView> {
        let mut tx = self.db.begin().await?;

        let item = sqlx::query_as::<_, CartItem>(&format!(
            "SELECT {} FROM cart_items WHERE id = $1 AND cart_id = $2 FOR UPDATE",
            CART_ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Cart item".to_string()))?;

        self.reservations
            .release_pair_in(&mut tx, item.stockable_ref(), cart_id)
            .await?;

        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item.id)
            .execute(&mut *tx)
            .await?;

        recompute_totals_in(&mut tx, cart_id).await?;
        tx.commit().await?;

        self.cart_view(cart_id).await
    }

    /// Empty the cart: release every hold, delete every line, zero totals
    pub async fn clear(&self, cart_id: Uuid) -> AppResult<CartView> {
        let cart = self.find_cart(cart_id).await?;

        let mut tx = self.db.begin().await?;
        self.reservations.release_by_cart_in(&mut tx, cart.id).await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;
        recompute_totals_in(&mut tx, cart.id).await?;
        tx.commit().await?;

        self.cart_view(cart.id).await
    }
}
