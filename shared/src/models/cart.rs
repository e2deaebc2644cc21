//! Cart status, totals arithmetic, and validation alert payloads

use serde::{Deserialize, Serialize};

use crate::models::coupon::CouponRejection;
use crate::models::product::PriceDrift;
use crate::types::Money;

/// Lifecycle status of a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    Abandoned,
    Converted,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Converted => "converted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(CartStatus::Active),
            "abandoned" => Some(CartStatus::Abandoned),
            "converted" => Some(CartStatus::Converted),
            _ => None,
        }
    }
}

/// Why a line was removed during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    ProductUnavailable,
    VariantMissing,
    OutOfStock,
}

/// User-facing alert emitted by the pre-checkout validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CartAlert {
    ItemRemoved {
        name: String,
        reason: RemovalReason,
    },
    QuantityReduced {
        name: String,
        requested: i64,
        available: i64,
    },
    PriceChanged {
        name: String,
        old_price: Money,
        new_price: Money,
        drift: PriceDrift,
    },
    CouponRemoved {
        code: String,
        reason: CouponRejection,
    },
}

impl CartAlert {
    /// Message shown to the shopper. Stock alerts always carry the real
    /// numbers, never a bare "error occurred".
    pub fn message(&self) -> String {
        match self {
            CartAlert::ItemRemoved { name, reason } => match reason {
                RemovalReason::ProductUnavailable => {
                    format!("{} is no longer available and was removed from your cart", name)
                }
                RemovalReason::VariantMissing => {
                    format!("The selected option of {} is no longer offered and was removed", name)
                }
                RemovalReason::OutOfStock => {
                    format!("{} is out of stock and was removed from your cart", name)
                }
            },
            CartAlert::QuantityReduced {
                name,
                requested,
                available,
            } => format!(
                "Only {} of {} left in stock; your quantity was reduced from {}",
                available, name, requested
            ),
            CartAlert::PriceChanged {
                name,
                old_price,
                new_price,
                drift,
            } => match drift {
                PriceDrift::Increased => format!(
                    "The price of {} went up from {} to {}",
                    name, old_price, new_price
                ),
                PriceDrift::Decreased => format!(
                    "The price of {} dropped from {} to {}",
                    name, old_price, new_price
                ),
                PriceDrift::SaleStarted => format!(
                    "{} is now on sale: {} instead of {}",
                    name, new_price, old_price
                ),
                PriceDrift::SaleEnded => format!(
                    "The promotion on {} ended; the price changed from {} to {}",
                    name, old_price, new_price
                ),
            },
            CartAlert::CouponRemoved { code, reason } => match reason {
                CouponRejection::Deactivated => {
                    format!("Coupon {} is no longer active and was removed", code)
                }
                CouponRejection::Expired => {
                    format!("Coupon {} has expired and was removed", code)
                }
                CouponRejection::UsageLimitReached => {
                    format!("Coupon {} has reached its usage limit and was removed", code)
                }
                CouponRejection::SubtotalBelowMinimum { minimum } => format!(
                    "Coupon {} requires a minimum order of {} and was removed",
                    code, minimum
                ),
            },
        }
    }
}

/// Derived cart totals. Always recomputed from the current line items plus
/// the coupon discount, never hand-edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Compute totals from (quantity, effective unit price) pairs and a discount.
/// The discount is clamped so the total never goes negative.
pub fn compute_totals(lines: &[(i64, Money)], discount: Money) -> CartTotals {
    let subtotal = Money(lines.iter().map(|(qty, price)| qty * price.cents()).sum());
    let discount = Money(discount.cents().clamp(0, subtotal.cents()));
    CartTotals {
        subtotal,
        discount,
        total: subtotal - discount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_sum_line_items() {
        let totals = compute_totals(&[(2, Money(5000)), (1, Money(2500))], Money::ZERO);
        assert_eq!(totals.subtotal, Money(12500));
        assert_eq!(totals.total, Money(12500));
    }

    #[test]
    fn discount_reduces_total_but_not_below_zero() {
        let totals = compute_totals(&[(1, Money(1000))], Money(1500));
        assert_eq!(totals.discount, Money(1000));
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn empty_cart_has_zero_totals() {
        assert_eq!(compute_totals(&[], Money(500)), CartTotals::default());
    }

    #[test]
    fn price_alert_names_old_and_new_formatted_prices() {
        let alert = CartAlert::PriceChanged {
            name: "Canvas Tote".to_string(),
            old_price: Money(5000),
            new_price: Money(6000),
            drift: PriceDrift::Increased,
        };
        let msg = alert.message();
        assert!(msg.contains("50.00"));
        assert!(msg.contains("60.00"));
    }

    #[test]
    fn quantity_alert_carries_before_and_after() {
        let alert = CartAlert::QuantityReduced {
            name: "Canvas Tote".to_string(),
            requested: 7,
            available: 3,
        };
        let msg = alert.message();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn drift_kinds_have_distinct_messages() {
        let mk = |drift| CartAlert::PriceChanged {
            name: "Mug".to_string(),
            old_price: Money(1000),
            new_price: Money(900),
            drift,
        };
        let messages: Vec<String> = [
            PriceDrift::Increased,
            PriceDrift::Decreased,
            PriceDrift::SaleStarted,
            PriceDrift::SaleEnded,
        ]
        .into_iter()
        .map(|d| mk(d).message())
        .collect();
        for i in 0..messages.len() {
            for j in i + 1..messages.len() {
                assert_ne!(messages[i], messages[j]);
            }
        }
    }
}
