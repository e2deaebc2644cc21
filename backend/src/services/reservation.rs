//! Time-bounded stock reservations on behalf of carts
//!
//! A reservation is a soft hold: it reduces what other carts may take
//! without touching on-hand quantity. Availability is always
//! `on-hand - sum(active holds)` where active means non-expired and
//! non-converted. Expired rows are excluded by query predicate and cleaned
//! up lazily; `purge_expired` is the explicit sweep.
//!
//! All hold mutations take the same `FOR UPDATE` lock on the stockable row
//! as the stock adjustment engine, so the availability read and the hold
//! write are a single serialized step and concurrent carts cannot
//! collectively over-reserve.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::{available_quantity, validate_quantity, MovementKind, StockableRef, StockableType};

use crate::config::StockConfig;
use crate::error::{AppError, AppResult};
use crate::services::stock::{
    append_entry, lock_stockable, lock_stockable_any, LedgerEntry, LedgerRef, StockService,
};

/// Reservation management service
#[derive(Clone)]
pub struct ReservationService {
    db: PgPool,
    config: StockConfig,
    stock: StockService,
}

/// A cart's hold on a quantity of one stockable
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub stockable_type: String,
    pub stockable_id: Uuid,
    pub cart_id: Uuid,
    pub quantity: i64,
    pub expires_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn stockable_ref(&self) -> StockableRef {
        StockableRef {
            // The discriminator column only ever holds values written from
            // StockableType::as_str
            kind: StockableType::from_str(&self.stockable_type).unwrap_or(StockableType::Product),
            id: self.stockable_id,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_converted(&self) -> bool {
        self.converted_at.is_some()
    }
}

const RESERVATION_COLUMNS: &str = "id, stockable_type, stockable_id, cart_id, quantity, \
     expires_at, converted_at, created_at, updated_at";

/// Sum of active holds on a stockable, excluding the given carts' own holds
/// (a cart is never penalized for quantity it already reserved)
pub(crate) async fn active_hold_sum<'e, E>(
    executor: E,
    stockable: StockableRef,
    exclude_carts: &[Uuid],
) -> AppResult<i64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let sum: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity), 0)::BIGINT
        FROM stock_reservations
        WHERE stockable_type = $1 AND stockable_id = $2
          AND expires_at > now() AND converted_at IS NULL
          AND cart_id <> ALL($3)
        "#,
    )
    .bind(stockable.kind.as_str())
    .bind(stockable.id)
    .bind(exclude_carts)
    .fetch_one(executor)
    .await?;
    Ok(sum)
}

impl ReservationService {
    /// Create a new ReservationService instance
    pub fn new(db: PgPool, config: &StockConfig, stock: StockService) -> Self {
        Self {
            db,
            config: config.clone(),
            stock,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::minutes(self.config.reservation_ttl_minutes)
    }

    /// Quantity available for new reservations: on-hand minus active holds.
    /// Effectively unlimited when the stockable does not manage stock.
    pub async fn available(&self, stockable: StockableRef) -> AppResult<i64> {
        let sql = format!(
            "SELECT stock_quantity, manage_stock FROM {} WHERE id = $1 AND deleted_at IS NULL",
            stockable.kind.table()
        );
        let (on_hand, manage_stock): (i64, bool) = sqlx::query_as(&sql)
            .bind(stockable.id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Stockable".to_string()))?;

        let held = active_hold_sum(&self.db, stockable, &[]).await?;
        Ok(available_quantity(on_hand, manage_stock, held))
    }

    /// Create or update this cart's hold on a stockable
    pub async fn reserve(
        &self,
        stockable: StockableRef,
        quantity: i64,
        cart_id: Uuid,
    ) -> AppResult<Reservation> {
        validate_quantity(quantity).map_err(|message| AppError::Validation {
            field: "quantity".to_string(),
            message: message.to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let reservation = self
            .apply_hold_in(&mut tx, stockable, cart_id, quantity, true)
            .await?;
        tx.commit().await?;
        Ok(reservation)
    }

    /// Upsert the (stockable, cart) hold to `quantity` under the stockable
    /// row lock. With `enforce_ceiling`, admission-checks the quantity
    /// against availability excluding this cart's own hold; callers that
    /// already clamped under the same lock (merge, validation, decreases)
    /// pass `false`.
    pub(crate) async fn apply_hold_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stockable: StockableRef,
        cart_id: Uuid,
        quantity: i64,
        enforce_ceiling: bool,
    ) -> AppResult<Reservation> {
        let row = lock_stockable(tx, stockable).await?;

        if enforce_ceiling {
            let held_by_others = active_hold_sum(&mut **tx, stockable, &[cart_id]).await?;
            let available = available_quantity(row.stock_quantity, row.manage_stock, held_by_others);
            if quantity > available {
                return Err(AppError::InsufficientStock {
                    name: row.name.clone(),
                    requested: quantity,
                    available,
                });
            }
        }

        // Previous hold for this pair. An expired row is reused by the
        // upsert but its ledger entry was never compensated, so balance it
        // here before writing the new hold.
        let now = Utc::now();
        let previous = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE stockable_type = $1 AND stockable_id = $2 AND cart_id = $3 \
               AND converted_at IS NULL FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(stockable.kind.as_str())
        .bind(stockable.id)
        .bind(cart_id)
        .fetch_optional(&mut **tx)
        .await?;

        let mut previous_active_qty = 0;
        if let Some(prev) = &previous {
            if prev.is_expired(now) {
                append_entry(
                    tx,
                    stockable,
                    row.stock_quantity,
                    prev.quantity,
                    MovementKind::ReservationRelease,
                    Some("expired".to_string()),
                    Some(LedgerRef::reservation(prev.id)),
                    None,
                )
                .await?;
            } else {
                previous_active_qty = prev.quantity;
            }
        }

        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO stock_reservations (stockable_type, stockable_id, cart_id, quantity, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (stockable_type, stockable_id, cart_id) WHERE converted_at IS NULL
            DO UPDATE SET quantity = EXCLUDED.quantity, expires_at = EXCLUDED.expires_at,
                          updated_at = now()
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(stockable.kind.as_str())
        .bind(stockable.id)
        .bind(cart_id)
        .bind(quantity)
        .bind(now + self.ttl())
        .fetch_one(&mut **tx)
        .await?;

        // Net change of the hold. A shrink is a partial release.
        let hold_delta = previous_active_qty - quantity;
        if hold_delta != 0 {
            let kind = if hold_delta < 0 {
                MovementKind::Reservation
            } else {
                MovementKind::ReservationRelease
            };
            append_entry(
                tx,
                stockable,
                row.stock_quantity,
                hold_delta,
                kind,
                None,
                Some(LedgerRef::reservation(reservation.id)),
                None,
            )
            .await?;
        }

        Ok(reservation)
    }

    /// Release a reservation. Safe to call twice: a missing or already
    /// converted reservation is a no-op, never an error.
    pub async fn release(&self, reservation_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        // Plain read to learn the stockable; the authoritative re-read
        // happens under the stockable lock in release_locked_in
        let candidate = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(candidate) = candidate {
            self.release_locked_in(&mut tx, &candidate, None, false)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Release the hold one cart has on one stockable, if any
    pub(crate) async fn release_pair_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        stockable: StockableRef,
        cart_id: Uuid,
    ) -> AppResult<()> {
        let candidate = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE stockable_type = $1 AND stockable_id = $2 AND cart_id = $3 \
               AND converted_at IS NULL",
            RESERVATION_COLUMNS
        ))
        .bind(stockable.kind.as_str())
        .bind(stockable.id)
        .bind(cart_id)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(candidate) = candidate {
            self.release_locked_in(tx, &candidate, None, false).await?;
        }
        Ok(())
    }

    /// Release every hold a cart has (cart cleared, merged away, or abandoned)
    pub(crate) async fn release_by_cart_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart_id: Uuid,
    ) -> AppResult<u64> {
        let candidates = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE cart_id = $1 AND converted_at IS NULL",
            RESERVATION_COLUMNS
        ))
        .bind(cart_id)
        .fetch_all(&mut **tx)
        .await?;

        let mut count = 0;
        for candidate in &candidates {
            if self.release_locked_in(tx, candidate, None, false).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Release every hold a cart has, in its own transaction
    pub async fn release_by_cart(&self, cart_id: Uuid) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;
        let count = self.release_by_cart_in(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(count)
    }

    /// The one release path: lock the stockable first (the same lock order
    /// every hold mutation uses), re-read the reservation under that lock,
    /// append the compensating ledger entry, delete the row.
    ///
    /// A soft-deleted or missing stockable never blocks a release; the
    /// ledger entry is simply skipped when there is no stock row left to
    /// project against. Returns whether a row was actually released.
    async fn release_locked_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        candidate: &Reservation,
        note: Option<String>,
        require_expired: bool,
    ) -> AppResult<bool> {
        let stockable = candidate.stockable_ref();
        let row = lock_stockable_any(tx, stockable).await?;

        // The candidate came from a plain read; it may have been released,
        // converted, or renewed while we waited for the lock
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE id = $1 AND converted_at IS NULL FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(candidate.id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(reservation) = reservation else {
            return Ok(false);
        };
        if require_expired && !reservation.is_expired(Utc::now()) {
            return Ok(false);
        }

        if let Some(row) = row {
            append_entry(
                tx,
                stockable,
                row.stock_quantity,
                reservation.quantity,
                MovementKind::ReservationRelease,
                note,
                Some(LedgerRef::reservation(reservation.id)),
                None,
            )
            .await?;
        }

        sqlx::query("DELETE FROM stock_reservations WHERE id = $1")
            .bind(reservation.id)
            .execute(&mut **tx)
            .await?;
        Ok(true)
    }

    /// Convert a reservation into a durable stock deduction at checkout.
    /// The only path that decrements on-hand for a cart. Idempotent: an
    /// already converted, expired, or missing reservation returns `None`.
    pub async fn convert_to_sale(
        &self,
        reservation_id: Uuid,
        order_id: Option<Uuid>,
    ) -> AppResult<Option<LedgerEntry>> {
        let mut tx = self.db.begin().await?;

        // Plain read to learn the stockable, then take the stockable lock
        // before re-reading, keeping the lock order shared with every other
        // hold mutation
        let candidate = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };
        lock_stockable(&mut tx, candidate.stockable_ref()).await?;

        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(reservation_id)
        .fetch_optional(&mut *tx)
        .await?;

        let reservation = match reservation {
            Some(r) if !r.is_converted() && !r.is_expired(Utc::now()) => r,
            _ => return Ok(None),
        };

        let reference = order_id
            .map(LedgerRef::order)
            .unwrap_or_else(|| LedgerRef::reservation(reservation.id));
        let (entry, low_stock) = self
            .stock
            .adjust_in(
                &mut tx,
                reservation.stockable_ref(),
                -reservation.quantity,
                MovementKind::Sale,
                None,
                Some(reference),
                None,
            )
            .await?;

        sqlx::query(
            "UPDATE stock_reservations SET converted_at = now(), updated_at = now() WHERE id = $1",
        )
        .bind(reservation.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.stock.dispatch_low_stock(low_stock);
        Ok(Some(entry))
    }

    /// Explicitly extend a reservation by one TTL from now. Expiry is never
    /// extended implicitly.
    pub async fn extend(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "UPDATE stock_reservations SET expires_at = $1, updated_at = now() \
             WHERE id = $2 AND converted_at IS NULL RETURNING {}",
            RESERVATION_COLUMNS
        ))
        .bind(Utc::now() + self.ttl())
        .bind(reservation_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Reservation".to_string()))?;
        Ok(reservation)
    }

    /// Delete expired reservations, appending the compensating ledger entry
    /// for each. Scheduling of this sweep is external.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;

        let expired = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE expires_at <= now() AND converted_at IS NULL",
            RESERVATION_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;

        let mut count = 0;
        for candidate in &expired {
            // require_expired: a hold renewed since the sweep's read is live
            // again and must survive
            if self
                .release_locked_in(&mut tx, candidate, Some("expired".to_string()), true)
                .await?
            {
                count += 1;
            }
        }

        tx.commit().await?;
        if count > 0 {
            tracing::info!("Purged {} expired reservations", count);
        }
        Ok(count)
    }

    /// Active reservations held by a cart
    pub async fn list_for_cart(&self, cart_id: Uuid) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM stock_reservations \
             WHERE cart_id = $1 AND converted_at IS NULL AND expires_at > now() \
             ORDER BY created_at",
            RESERVATION_COLUMNS
        ))
        .bind(cart_id)
        .fetch_all(&self.db)
        .await?;
        Ok(reservations)
    }
}
