//! Product status and price-drift classification

use serde::{Deserialize, Serialize};

use crate::types::Money;

/// Publication status of a catalog product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    Active,
    Archived,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Draft => "draft",
            ProductStatus::Active => "active",
            ProductStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ProductStatus::Draft),
            "active" => Some(ProductStatus::Active),
            "archived" => Some(ProductStatus::Archived),
            _ => None,
        }
    }

    pub fn is_purchasable(&self) -> bool {
        matches!(self, ProductStatus::Active)
    }
}

/// Unit price plus optional sale price, as snapshotted on a cart line or
/// read live from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub unit_price: Money,
    pub sale_price: Option<Money>,
}

impl PriceSnapshot {
    pub fn new(unit_price: Money, sale_price: Option<Money>) -> Self {
        Self {
            unit_price,
            sale_price,
        }
    }

    /// The price a line actually pays
    pub fn effective(&self) -> Money {
        self.sale_price.unwrap_or(self.unit_price)
    }
}

/// How a cart line's snapshotted price drifted from the live catalog value.
/// Each variant maps to a distinct user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceDrift {
    Increased,
    Decreased,
    SaleStarted,
    SaleEnded,
}

/// Classify the drift between a stored snapshot and the live catalog price.
/// Returns `None` when nothing changed.
///
/// Sale-state transitions take priority over the raw comparison so that a
/// promotion starting or ending is reported as such even when the effective
/// amount also moved.
pub fn classify_price_drift(stored: PriceSnapshot, live: PriceSnapshot) -> Option<PriceDrift> {
    if stored == live {
        return None;
    }
    match (stored.sale_price, live.sale_price) {
        (None, Some(_)) => Some(PriceDrift::SaleStarted),
        (Some(_), None) => Some(PriceDrift::SaleEnded),
        _ => {
            if live.effective() > stored.effective() {
                Some(PriceDrift::Increased)
            } else if live.effective() < stored.effective() {
                Some(PriceDrift::Decreased)
            } else {
                // Same effective amount, e.g. list price moved under an
                // unchanged sale price. Report by the list price direction.
                if live.unit_price > stored.unit_price {
                    Some(PriceDrift::Increased)
                } else {
                    Some(PriceDrift::Decreased)
                }
            }
        }
    }
}
