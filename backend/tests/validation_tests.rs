//! Cart validation engine tests
//!
//! Tests for the pre-checkout reconciliation pass including:
//! - Per-item policy priority order
//! - Price drift classification
//! - User-facing alert messages carrying real numbers

use proptest::prelude::*;

use shared::{
    classify_price_drift, CartAlert, CouponRejection, Money, PriceDrift, PriceSnapshot,
    ProductStatus, RemovalReason,
};

fn snap(unit: i64, sale: Option<i64>) -> PriceSnapshot {
    PriceSnapshot::new(Money(unit), sale.map(Money))
}

/// The per-item policy as an ordered decision, mirroring the engine: the
/// first failing rule decides, later rules are not consulted
fn item_verdict(
    product_exists: bool,
    status: ProductStatus,
    variant_ok: bool,
    available: i64,
    quantity: i64,
) -> Option<RemovalReason> {
    if !product_exists {
        return Some(RemovalReason::ProductUnavailable);
    }
    if !status.is_purchasable() {
        return Some(RemovalReason::ProductUnavailable);
    }
    if !variant_ok {
        return Some(RemovalReason::VariantMissing);
    }
    if available == 0 {
        return Some(RemovalReason::OutOfStock);
    }
    let _ = quantity;
    None
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_missing_product_removed_first() {
        // Even with everything else broken, the product rule wins
        assert_eq!(
            item_verdict(false, ProductStatus::Archived, false, 0, 5),
            Some(RemovalReason::ProductUnavailable)
        );
    }

    #[test]
    fn test_unpurchasable_status_removes_item() {
        assert_eq!(
            item_verdict(true, ProductStatus::Draft, true, 10, 1),
            Some(RemovalReason::ProductUnavailable)
        );
        assert_eq!(
            item_verdict(true, ProductStatus::Archived, true, 10, 1),
            Some(RemovalReason::ProductUnavailable)
        );
    }

    #[test]
    fn test_missing_variant_checked_before_stock() {
        assert_eq!(
            item_verdict(true, ProductStatus::Active, false, 0, 1),
            Some(RemovalReason::VariantMissing)
        );
    }

    #[test]
    fn test_zero_availability_removes_item() {
        assert_eq!(
            item_verdict(true, ProductStatus::Active, true, 0, 1),
            Some(RemovalReason::OutOfStock)
        );
    }

    #[test]
    fn test_healthy_item_survives() {
        assert_eq!(item_verdict(true, ProductStatus::Active, true, 10, 3), None);
    }

    /// A clamp is an update, not a removal: quantity above availability
    /// reduces to what is left
    #[test]
    fn test_excess_quantity_clamps_to_available() {
        let available = 3i64;
        let quantity = 7i64;
        assert!(item_verdict(true, ProductStatus::Active, true, available, quantity).is_none());
        let clamped = quantity.min(available);
        assert_eq!(clamped, 3);
    }

    #[test]
    fn test_drift_classification_no_change() {
        assert_eq!(classify_price_drift(snap(5000, None), snap(5000, None)), None);
    }

    #[test]
    fn test_drift_sale_transitions_take_priority() {
        assert_eq!(
            classify_price_drift(snap(5000, None), snap(5000, Some(4500))),
            Some(PriceDrift::SaleStarted)
        );
        assert_eq!(
            classify_price_drift(snap(5000, Some(4500)), snap(4000, None)),
            Some(PriceDrift::SaleEnded)
        );
    }

    #[test]
    fn test_drift_plain_moves() {
        assert_eq!(
            classify_price_drift(snap(5000, None), snap(5500, None)),
            Some(PriceDrift::Increased)
        );
        assert_eq!(
            classify_price_drift(snap(5000, Some(4000)), snap(5000, Some(3500))),
            Some(PriceDrift::Decreased)
        );
    }

    #[test]
    fn test_quantity_alert_carries_both_numbers() {
        let alert = CartAlert::QuantityReduced {
            name: "Wool Scarf".to_string(),
            requested: 9,
            available: 2,
        };
        let msg = alert.message();
        assert!(msg.contains('9'));
        assert!(msg.contains('2'));
        assert!(msg.contains("Wool Scarf"));
    }

    #[test]
    fn test_price_alert_formats_cents_as_decimal() {
        let alert = CartAlert::PriceChanged {
            name: "Wool Scarf".to_string(),
            old_price: Money(2550),
            new_price: Money(3000),
            drift: PriceDrift::Increased,
        };
        let msg = alert.message();
        assert!(msg.contains("25.50"));
        assert!(msg.contains("30.00"));
    }

    #[test]
    fn test_coupon_alert_names_the_code_and_reason() {
        let alert = CartAlert::CouponRemoved {
            code: "WELCOME10".to_string(),
            reason: CouponRejection::SubtotalBelowMinimum {
                minimum: Money(5000),
            },
        };
        let msg = alert.message();
        assert!(msg.contains("WELCOME10"));
        assert!(msg.contains("50.00"));
    }

    #[test]
    fn test_removal_messages_distinguish_reasons() {
        let make = |reason| {
            CartAlert::ItemRemoved {
                name: "Mug".to_string(),
                reason,
            }
            .message()
        };
        let a = make(RemovalReason::ProductUnavailable);
        let b = make(RemovalReason::VariantMissing);
        let c = make(RemovalReason::OutOfStock);
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn snapshot_strategy() -> impl Strategy<Value = PriceSnapshot> {
        (1i64..100_000, prop::option::of(1i64..100_000))
            .prop_map(|(unit, sale)| snap(unit, sale))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Drift is reported exactly when the snapshots differ
        #[test]
        fn prop_drift_iff_snapshots_differ(
            stored in snapshot_strategy(),
            live in snapshot_strategy()
        ) {
            let drift = classify_price_drift(stored, live);
            prop_assert_eq!(drift.is_none(), stored == live);
        }

        /// Sale-state transitions are always reported as such, regardless of
        /// the price direction
        #[test]
        fn prop_sale_transitions_classified(
            unit_a in 1i64..100_000,
            unit_b in 1i64..100_000,
            sale in 1i64..100_000
        ) {
            prop_assert_eq!(
                classify_price_drift(snap(unit_a, None), snap(unit_b, Some(sale))),
                Some(PriceDrift::SaleStarted)
            );
            prop_assert_eq!(
                classify_price_drift(snap(unit_a, Some(sale)), snap(unit_b, None)),
                Some(PriceDrift::SaleEnded)
            );
        }

        /// Every alert renders a non-empty, human-readable message
        #[test]
        fn prop_alert_messages_nonempty(
            requested in 1i64..100,
            available in 0i64..100
        ) {
            let alert = CartAlert::QuantityReduced {
                name: "Item".to_string(),
                requested,
                available,
            };
            prop_assert!(!alert.message().is_empty());
        }

        /// The verdict respects priority: an unpurchasable product is never
        /// reported as out of stock
        #[test]
        fn prop_status_outranks_stock(
            available in 0i64..10,
            quantity in 1i64..10
        ) {
            let verdict = item_verdict(true, ProductStatus::Archived, true, available, quantity);
            prop_assert_eq!(verdict, Some(RemovalReason::ProductUnavailable));
        }
    }
}
