//! Stock adjustment engine and append-only stock ledger
//!
//! This service is the only code path allowed to mutate a stockable's
//! on-hand quantity. Every mutation takes a `FOR UPDATE` lock on the
//! stockable row, enforces the non-negative invariant, and appends a ledger
//! entry in the same transaction.
//!
//! Ledger semantics: entries of kind `reservation` / `reservation_release`
//! are soft-hold bookkeeping. Their before/after values record the
//! availability projection at the time of the hold and they never change
//! on-hand quantity, so they must only ever be compared against each other,
//! never summed against on-hand. All other kinds accompany a real on-hand
//! write and satisfy `qty_after = qty_before + delta` against the stock row.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{
    crossed_low_stock, validate_adjustment_delta, MovementKind, Pagination, PaginatedResponse,
    StockableRef,
};

use crate::config::StockConfig;
use crate::error::{AppError, AppResult};
use crate::services::alerts::{AlertService, LowStockEvent};

/// Stock adjustment service
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
    config: StockConfig,
    alerts: AlertService,
}

/// Append-only stock ledger entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub stockable_type: String,
    pub stockable_id: Uuid,
    pub delta: i64,
    pub qty_before: i64,
    pub qty_after: i64,
    pub kind: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Optional polymorphic reference carried by a ledger entry
#[derive(Debug, Clone)]
pub struct LedgerRef {
    pub entity: &'static str,
    pub id: Uuid,
}

impl LedgerRef {
    pub fn order(id: Uuid) -> Self {
        Self {
            entity: "order",
            id,
        }
    }

    pub fn reservation(id: Uuid) -> Self {
        Self {
            entity: "reservation",
            id,
        }
    }
}

/// Stockable row held under a `FOR UPDATE` lock for the duration of a
/// read-modify-write
#[derive(Debug, Clone, FromRow)]
pub(crate) struct LockedStockable {
    pub name: String,
    pub stock_quantity: i64,
    pub manage_stock: bool,
    pub allow_backorders: bool,
    pub low_stock_threshold: Option<i64>,
    pub notify_low_stock: bool,
}

/// Lock the stockable row for the rest of the transaction. Serializes all
/// concurrent adjustments and reservations touching the same item.
pub(crate) async fn lock_stockable(
    tx: &mut Transaction<'_, Postgres>,
    stockable: StockableRef,
) -> AppResult<LockedStockable> {
    let sql = format!(
        "SELECT name, stock_quantity, manage_stock, allow_backorders, \
         low_stock_threshold, notify_low_stock \
         FROM {} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        stockable.kind.table()
    );
    sqlx::query_as::<_, LockedStockable>(&sql)
        .bind(stockable.id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Stockable".to_string()))
}

/// Like [`lock_stockable`], but including soft-deleted rows. Releasing a hold
/// must never depend on the stockable still being live; a row that is gone
/// entirely yields `None` and the caller skips the ledger bookkeeping.
pub(crate) async fn lock_stockable_any(
    tx: &mut Transaction<'_, Postgres>,
    stockable: StockableRef,
) -> AppResult<Option<LockedStockable>> {
    let sql = format!(
        "SELECT name, stock_quantity, manage_stock, allow_backorders, \
         low_stock_threshold, notify_low_stock \
         FROM {} WHERE id = $1 FOR UPDATE",
        stockable.kind.table()
    );
    let row = sqlx::query_as::<_, LockedStockable>(&sql)
        .bind(stockable.id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row)
}

impl StockService {
    /// Create a new StockService instance
    pub fn new(db: PgPool, config: &StockConfig, alerts: AlertService) -> Self {
        Self {
            db,
            config: config.clone(),
            alerts,
        }
    }

    /// Adjust a stockable's on-hand quantity and write the ledger entry, all
    /// in one transaction. Fires the low-stock alert after commit.
    pub async fn adjust(
        &self,
        stockable: StockableRef,
        delta: i64,
        kind: MovementKind,
        note: Option<String>,
        reference: Option<LedgerRef>,
        actor_id: Option<Uuid>,
    ) -> AppResult<LedgerEntry> {
        validate_adjustment_delta(delta).map_err(|message| AppError::Validation {
            field: "delta".to_string(),
            message: message.to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let (entry, low_stock) = self
            .adjust_in(&mut tx, stockable, delta, kind, note, reference, actor_id)
            .await?;
        tx.commit().await?;

        self.dispatch_low_stock(low_stock);
        Ok(entry)
    }

    /// Record a completed sale: a negative adjustment referencing the order
    pub async fn record_sale(
        &self,
        stockable: StockableRef,
        quantity: i64,
        order_id: Option<Uuid>,
    ) -> AppResult<LedgerEntry> {
        self.adjust(
            stockable,
            -quantity,
            MovementKind::Sale,
            None,
            order_id.map(LedgerRef::order),
            None,
        )
        .await
    }

    /// Record a refund: a positive adjustment referencing the order
    pub async fn refund(
        &self,
        stockable: StockableRef,
        quantity: i64,
        order_id: Option<Uuid>,
    ) -> AppResult<LedgerEntry> {
        self.adjust(
            stockable,
            quantity,
            MovementKind::Refund,
            None,
            order_id.map(LedgerRef::order),
            None,
        )
        .await
    }

    /// The read-modify-write core, usable inside a caller-owned transaction.
    /// Returns the ledger entry and, when the adjustment crossed the
    /// low-stock threshold, the event to dispatch after commit.
    pub(crate) async fn adjust_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stockable: StockableRef,
        delta: i64,
        kind: MovementKind,
        note: Option<String>,
        reference: Option<LedgerRef>,
        actor_id: Option<Uuid>,
    ) -> AppResult<(LedgerEntry, Option<LowStockEvent>)> {
        let row = lock_stockable(tx, stockable).await?;

        let before = row.stock_quantity;
        let after = before + delta;

        if after < 0 && !row.allow_backorders && !self.config.allow_negative_stock {
            return Err(AppError::InsufficientStock {
                name: row.name,
                requested: delta.abs(),
                available: before,
            });
        }

        let sql = format!(
            "UPDATE {} SET stock_quantity = $1, updated_at = now() WHERE id = $2",
            stockable.kind.table()
        );
        sqlx::query(&sql)
            .bind(after)
            .bind(stockable.id)
            .execute(&mut **tx)
            .await?;

        let entry =
            append_entry(tx, stockable, before, delta, kind, note, reference, actor_id).await?;

        let threshold = row
            .low_stock_threshold
            .unwrap_or(self.config.default_low_stock_threshold);
        let low_stock = (row.notify_low_stock && crossed_low_stock(before, after, threshold))
            .then(|| LowStockEvent {
                stockable,
                name: row.name,
                quantity: after,
                threshold,
            });

        Ok((entry, low_stock))
    }

    /// Spawn the fire-and-forget low-stock dispatch. Runs outside the
    /// caller's transaction; failures are handled inside the alert service.
    pub(crate) fn dispatch_low_stock(&self, event: Option<LowStockEvent>) {
        if let Some(event) = event {
            let alerts = self.alerts.clone();
            tokio::spawn(async move {
                alerts.notify_low_stock(event).await;
            });
        }
    }

    /// List ledger entries for a stockable, newest first
    pub async fn list_ledger(
        &self,
        stockable: StockableRef,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<LedgerEntry>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM stock_ledger WHERE stockable_type = $1 AND stockable_id = $2",
        )
        .bind(stockable.kind.as_str())
        .bind(stockable.id)
        .fetch_one(&self.db)
        .await?;

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, stockable_type, stockable_id, delta, qty_before, qty_after, kind,
                   reference_type, reference_id, note, actor_id, created_at
            FROM stock_ledger
            WHERE stockable_type = $1 AND stockable_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(stockable.kind.as_str())
        .bind(stockable.id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            data: entries,
            pagination: shared::PaginationMeta {
                page: pagination.page,
                per_page: pagination.per_page,
                total_items: total as u64,
            },
        })
    }
}

/// Append a ledger entry. `qty_before`/`qty_after` are the caller's view of
/// the quantity around this movement; for soft-hold kinds that is the
/// availability projection, not an on-hand write.
pub(crate) async fn append_entry(
    tx: &mut Transaction<'_, Postgres>,
    stockable: StockableRef,
    before: i64,
    delta: i64,
    kind: MovementKind,
    note: Option<String>,
    reference: Option<LedgerRef>,
    actor_id: Option<Uuid>,
) -> AppResult<LedgerEntry> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO stock_ledger (
            stockable_type, stockable_id, delta, qty_before, qty_after, kind,
            reference_type, reference_id, note, actor_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, stockable_type, stockable_id, delta, qty_before, qty_after, kind,
                  reference_type, reference_id, note, actor_id, created_at
        "#,
    )
    .bind(stockable.kind.as_str())
    .bind(stockable.id)
    .bind(delta)
    .bind(before)
    .bind(before + delta)
    .bind(kind.as_str())
    .bind(reference.as_ref().map(|r| r.entity))
    .bind(reference.as_ref().map(|r| r.id))
    .bind(note)
    .bind(actor_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(entry)
}
