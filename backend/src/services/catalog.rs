//! Read-only catalog lookups used by the cart and validation engines
//!
//! The catalog itself (product CRUD, categories, media) is managed
//! elsewhere; this service only reads what the stock core needs: identity,
//! status, live prices, and the stock capability fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{
    Money, PriceSnapshot, ProductStatus, Stockable, StockableRef,
};

use crate::error::{AppError, AppResult};

/// Catalog lookup service
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

/// Product row as read from the catalog
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub unit_price: i64,
    pub sale_price: Option<i64>,
    pub stock_quantity: i64,
    pub manage_stock: bool,
    pub allow_backorders: bool,
    pub low_stock_threshold: Option<i64>,
    pub notify_low_stock: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn product_status(&self) -> ProductStatus {
        ProductStatus::from_str(&self.status).unwrap_or(ProductStatus::Draft)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Stockable for Product {
    fn stockable_ref(&self) -> StockableRef {
        StockableRef::product(self.id)
    }

    fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    fn manages_stock(&self) -> bool {
        self.manage_stock
    }

    fn allows_backorders(&self) -> bool {
        self.allow_backorders
    }

    fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold.unwrap_or(0)
    }

    fn notifies_on_low_stock(&self) -> bool {
        self.notify_low_stock
    }
}

/// Variant row as read from the catalog. Prices are optional overrides of
/// the parent product's prices.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub stock_quantity: i64,
    pub manage_stock: bool,
    pub allow_backorders: bool,
    pub low_stock_threshold: Option<i64>,
    pub notify_low_stock: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProductVariant {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Stockable for ProductVariant {
    fn stockable_ref(&self) -> StockableRef {
        StockableRef::variant(self.id)
    }

    fn stock_quantity(&self) -> i64 {
        self.stock_quantity
    }

    fn manages_stock(&self) -> bool {
        self.manage_stock
    }

    fn allows_backorders(&self) -> bool {
        self.allow_backorders
    }

    fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold.unwrap_or(0)
    }

    fn notifies_on_low_stock(&self) -> bool {
        self.notify_low_stock
    }
}

const PRODUCT_COLUMNS: &str = "id, name, status, unit_price, sale_price, stock_quantity, \
     manage_stock, allow_backorders, low_stock_threshold, notify_low_stock, deleted_at";

const VARIANT_COLUMNS: &str = "id, product_id, name, unit_price, sale_price, stock_quantity, \
     manage_stock, allow_backorders, low_stock_threshold, notify_low_stock, deleted_at";

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Find a live (non-deleted) product
    pub async fn find_product(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE id = $1 AND deleted_at IS NULL",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(product)
    }

    /// Find a product including soft-deleted rows. Used only by the cart
    /// validation pass, which needs to tell "deleted" apart from "missing".
    pub async fn find_product_any(&self, product_id: Uuid) -> AppResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(product)
    }

    /// Find a live variant belonging to the given product
    pub async fn find_variant(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> AppResult<Option<ProductVariant>> {
        let sql = format!(
            "SELECT {} FROM product_variants WHERE id = $1 AND product_id = $2 AND deleted_at IS NULL",
            VARIANT_COLUMNS
        );
        let variant = sqlx::query_as::<_, ProductVariant>(&sql)
            .bind(variant_id)
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(variant)
    }

    /// Find a variant including soft-deleted rows (validation pass)
    pub async fn find_variant_any(
        &self,
        product_id: Uuid,
        variant_id: Uuid,
    ) -> AppResult<Option<ProductVariant>> {
        let sql = format!(
            "SELECT {} FROM product_variants WHERE id = $1 AND product_id = $2",
            VARIANT_COLUMNS
        );
        let variant = sqlx::query_as::<_, ProductVariant>(&sql)
            .bind(variant_id)
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(variant)
    }

    /// A product that exists and is purchasable, or the business error the
    /// cart engine surfaces to the shopper
    pub async fn purchasable_product(&self, product_id: Uuid) -> AppResult<Product> {
        let product = self
            .find_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        if !product.product_status().is_purchasable() {
            return Err(AppError::ProductNotAvailable {
                name: product.name.clone(),
            });
        }
        Ok(product)
    }

    /// Live price for a product or one of its variants. A variant without a
    /// price override sells at the product's price.
    pub fn live_price(product: &Product, variant: Option<&ProductVariant>) -> PriceSnapshot {
        match variant {
            Some(v) => PriceSnapshot::new(
                Money(v.unit_price.unwrap_or(product.unit_price)),
                v.sale_price.or(product.sale_price).map(Money),
            ),
            None => PriceSnapshot::new(Money(product.unit_price), product.sale_price.map(Money)),
        }
    }
}
