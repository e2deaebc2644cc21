//! Cart item engine tests
//!
//! Tests for cart line management including:
//! - Totals arithmetic and coupon discounts
//! - Quantity update direction rules
//! - Price snapshots

use chrono::{Duration, Utc};
use proptest::prelude::*;

use shared::{
    compute_totals, validate_quantity, CouponDiscount, CouponRejection, CouponTerms, Money,
    PriceSnapshot,
};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_totals_sum_quantity_times_effective_price() {
        let lines = [(2, Money(5000)), (3, Money(1000))];
        let totals = compute_totals(&lines, Money::ZERO);
        assert_eq!(totals.subtotal, Money(13000));
        assert_eq!(totals.discount, Money::ZERO);
        assert_eq!(totals.total, Money(13000));
    }

    #[test]
    fn test_sale_price_wins_when_present() {
        let snap = PriceSnapshot::new(Money(5000), Some(Money(4000)));
        assert_eq!(snap.effective(), Money(4000));

        let no_sale = PriceSnapshot::new(Money(5000), None);
        assert_eq!(no_sale.effective(), Money(5000));
    }

    #[test]
    fn test_fixed_coupon_discount() {
        let totals = compute_totals(
            &[(1, Money(10000))],
            CouponDiscount::Fixed(Money(1500)).amount(Money(10000)),
        );
        assert_eq!(totals.discount, Money(1500));
        assert_eq!(totals.total, Money(8500));
    }

    #[test]
    fn test_percent_coupon_discount() {
        let subtotal = Money(8000);
        let discount = CouponDiscount::Percent(25).amount(subtotal);
        assert_eq!(discount, Money(2000));
    }

    #[test]
    fn test_discount_clamped_to_subtotal() {
        let totals = compute_totals(&[(1, Money(500))], Money(9999));
        assert_eq!(totals.discount, Money(500));
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        let totals = compute_totals(&[], Money(1000));
        assert_eq!(totals.subtotal, Money::ZERO);
        assert_eq!(totals.discount, Money::ZERO);
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn test_quantity_validation_rejects_non_positive() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(100).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
    }

    /// Only the increase direction is admission-checked: a decrease must
    /// always succeed even if availability collapsed in the meantime
    #[test]
    fn test_decrease_never_blocked_by_availability() {
        let current_quantity = 5i64;

        for (new_quantity, expect_check) in [(7, true), (5, false), (3, false), (1, false)] {
            let enforce_ceiling = new_quantity > current_quantity;
            assert_eq!(enforce_ceiling, expect_check);
        }
    }

    #[test]
    fn test_coupon_minimum_checked_against_recalculated_subtotal() {
        let terms = CouponTerms {
            active: true,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            minimum_subtotal: Some(Money(5000)),
        };

        // Cart shrank below the minimum after a line was removed
        assert_eq!(
            terms.eligibility(Utc::now(), Money(3000)),
            Err(CouponRejection::SubtotalBelowMinimum {
                minimum: Money(5000)
            })
        );
        assert!(terms.eligibility(Utc::now(), Money(5000)).is_ok());
    }

    /// Two requests racing to create the owner's first cart must both end
    /// up with the same cart: the loser of the unique-index race re-fetches
    /// the winner's row instead of surfacing an error
    #[test]
    fn test_lost_create_race_resolves_to_existing_cart() {
        // One active cart per owner, enforced the way the partial unique
        // index does it: the second insert fails, then the fallback lookup
        // finds the winner's row
        struct UniqueViolation;

        let mut active_cart: Option<u32> = None;

        let mut insert = |id: u32| -> Result<u32, UniqueViolation> {
            if active_cart.is_some() {
                return Err(UniqueViolation);
            }
            active_cart = Some(id);
            Ok(id)
        };

        let winner = insert(1).unwrap_or_else(|_| unreachable!());
        let second = insert(2);
        let loser = match second {
            Ok(id) => id,
            Err(UniqueViolation) => active_cart.unwrap(),
        };
        assert_eq!(winner, 1);
        assert_eq!(loser, winner);
    }

    #[test]
    fn test_coupon_expiry_is_strict() {
        let terms = CouponTerms {
            active: true,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
            usage_limit: None,
            usage_count: 0,
            minimum_subtotal: None,
        };
        assert_eq!(
            terms.eligibility(Utc::now(), Money(10000)),
            Err(CouponRejection::Expired)
        );
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn line_strategy() -> impl Strategy<Value = (i64, Money)> {
        (1i64..50, (0i64..100_000).prop_map(Money))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Totals are internally consistent: total = subtotal - discount,
        /// discount never exceeds subtotal, nothing is negative
        #[test]
        fn prop_totals_consistent(
            lines in prop::collection::vec(line_strategy(), 0..10),
            discount in 0i64..1_000_000
        ) {
            let totals = compute_totals(&lines, Money(discount));
            prop_assert!(totals.subtotal.cents() >= 0);
            prop_assert!(totals.discount.cents() >= 0);
            prop_assert!(totals.discount <= totals.subtotal);
            prop_assert_eq!(totals.total, totals.subtotal - totals.discount);
            prop_assert!(totals.total.cents() >= 0);
        }

        /// Percent discounts stay within 0..=subtotal for sane percentages
        #[test]
        fn prop_percent_discount_bounded(
            subtotal in 0i64..1_000_000,
            pct in 0i64..=100
        ) {
            let discount = CouponDiscount::Percent(pct).amount(Money(subtotal));
            prop_assert!(discount.cents() >= 0);
            prop_assert!(discount <= Money(subtotal));
        }

        /// Recomputing totals is deterministic: same lines, same result
        #[test]
        fn prop_totals_deterministic(
            lines in prop::collection::vec(line_strategy(), 0..10),
            discount in 0i64..100_000
        ) {
            let first = compute_totals(&lines, Money(discount));
            let second = compute_totals(&lines, Money(discount));
            prop_assert_eq!(first, second);
        }
    }
}
