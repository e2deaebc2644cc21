//! Stockable identity, stock movement kinds, and availability arithmetic

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator for the two kinds of catalog entity that carry stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockableType {
    Product,
    Variant,
}

impl StockableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockableType::Product => "product",
            StockableType::Variant => "variant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "product" => Some(StockableType::Product),
            "variant" => Some(StockableType::Variant),
            _ => None,
        }
    }

    /// Table holding the stock columns for this stockable kind
    pub fn table(&self) -> &'static str {
        match self {
            StockableType::Product => "products",
            StockableType::Variant => "product_variants",
        }
    }
}

/// Polymorphic reference to a stockable (type discriminator + id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockableRef {
    pub kind: StockableType,
    pub id: Uuid,
}

impl StockableRef {
    pub fn product(id: Uuid) -> Self {
        Self {
            kind: StockableType::Product,
            id,
        }
    }

    pub fn variant(id: Uuid) -> Self {
        Self {
            kind: StockableType::Variant,
            id,
        }
    }
}

impl std::fmt::Display for StockableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Capability interface over any catalog entity carrying an on-hand quantity.
///
/// Implemented by the product and variant rows in the backend; everything
/// above the stock adjustment engine works against this trait and
/// [`StockableRef`], never against a concrete catalog type.
pub trait Stockable {
    fn stockable_ref(&self) -> StockableRef;
    fn stock_quantity(&self) -> i64;
    fn manages_stock(&self) -> bool;
    fn allows_backorders(&self) -> bool;
    fn low_stock_threshold(&self) -> i64;
    fn notifies_on_low_stock(&self) -> bool;
}

/// Kind of stock ledger movement.
///
/// `Reservation` and `ReservationRelease` are soft-hold bookkeeping: they
/// record the hold and its compensation but never change on-hand quantity,
/// so they must not be summed against on-hand. Only the remaining kinds
/// accompany a real on-hand mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    Refund,
    Reservation,
    ReservationRelease,
    ManualEntry,
    ManualExit,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Sale => "sale",
            MovementKind::Refund => "refund",
            MovementKind::Reservation => "reservation",
            MovementKind::ReservationRelease => "reservation_release",
            MovementKind::ManualEntry => "manual_entry",
            MovementKind::ManualExit => "manual_exit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(MovementKind::Sale),
            "refund" => Some(MovementKind::Refund),
            "reservation" => Some(MovementKind::Reservation),
            "reservation_release" => Some(MovementKind::ReservationRelease),
            "manual_entry" => Some(MovementKind::ManualEntry),
            "manual_exit" => Some(MovementKind::ManualExit),
            _ => None,
        }
    }

    /// Whether ledger entries of this kind reflect a real on-hand change
    pub fn moves_on_hand(&self) -> bool {
        !matches!(
            self,
            MovementKind::Reservation | MovementKind::ReservationRelease
        )
    }
}

/// Quantity available for new reservations: on-hand minus the sum of active
/// (non-expired, non-converted) reservations, floored at zero. Unmanaged
/// stock is effectively unlimited.
pub fn available_quantity(on_hand: i64, manages_stock: bool, active_reserved: i64) -> i64 {
    if !manages_stock {
        return i64::MAX;
    }
    (on_hand - active_reserved).max(0)
}

/// Target quantity for a merged cart line: the combined quantity, clamped to
/// what the stock ceiling leaves after other carts' holds. May be zero or
/// negative, in which case the line is dropped.
pub fn merged_line_quantity(
    user_qty: i64,
    session_qty: i64,
    on_hand: i64,
    reserved_by_other_carts: i64,
) -> i64 {
    (user_qty + session_qty).min(on_hand - reserved_by_other_carts)
}

/// Whether an adjustment moved the quantity across the low-stock threshold
/// (from above to at-or-below). Only the crossing fires an alert, so repeated
/// small adjustments below the threshold do not spam.
pub fn crossed_low_stock(before: i64, after: i64, threshold: i64) -> bool {
    before > threshold && after <= threshold
}
