//! Reservation manager tests
//!
//! Tests for the soft-hold reservation model including:
//! - Availability = on-hand minus active holds
//! - Serialized admission never over-reserves
//! - Idempotent release and conversion

use std::collections::HashMap;

use proptest::prelude::*;

use shared::available_quantity;

/// In-memory model of the reservation table for one stockable: at most one
/// active hold per cart, admission checked against availability with the
/// cart's own hold excluded
#[derive(Debug)]
struct HoldModel {
    on_hand: i64,
    live: bool,
    holds: HashMap<u32, i64>,
}

impl HoldModel {
    fn new(on_hand: i64) -> Self {
        Self {
            on_hand,
            live: true,
            holds: HashMap::new(),
        }
    }

    /// Soft-delete the stockable. Existing holds stay until released.
    fn soft_delete(&mut self) {
        self.live = false;
    }

    fn held_excluding(&self, cart: u32) -> i64 {
        self.holds
            .iter()
            .filter(|(c, _)| **c != cart)
            .map(|(_, q)| q)
            .sum()
    }

    fn available_for(&self, cart: u32) -> i64 {
        available_quantity(self.on_hand, true, self.held_excluding(cart))
    }

    /// Upsert the cart's hold, admission-checked. Mirrors the engine: the
    /// new quantity replaces the old, it is not added to it. Only live
    /// stockables admit new holds.
    fn reserve(&mut self, cart: u32, quantity: i64) -> Result<(), ()> {
        if !self.live || quantity > self.available_for(cart) {
            return Err(());
        }
        self.holds.insert(cart, quantity);
        Ok(())
    }

    /// Releasing never depends on the stockable being live
    fn release(&mut self, cart: u32) {
        self.holds.remove(&cart);
    }

    /// Convert the cart's hold into a durable deduction. Idempotent: once
    /// the hold is gone a second call changes nothing.
    fn convert(&mut self, cart: u32) -> bool {
        if !self.live {
            return false;
        }
        match self.holds.remove(&cart) {
            Some(quantity) => {
                self.on_hand -= quantity;
                true
            }
            None => false,
        }
    }

    fn total_held(&self) -> i64 {
        self.holds.values().sum()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Scenario: two carts competing for the last unit; exactly one wins
    #[test]
    fn test_last_unit_goes_to_one_cart() {
        let mut model = HoldModel::new(1);
        assert!(model.reserve(1, 1).is_ok());
        assert!(model.reserve(2, 1).is_err());
        assert_eq!(model.available_for(2), 0);
    }

    /// Scenario: the losing cart gets the unit once the winner releases
    #[test]
    fn test_release_returns_availability() {
        let mut model = HoldModel::new(1);
        assert!(model.reserve(1, 1).is_ok());
        model.release(1);
        assert!(model.reserve(2, 1).is_ok());
    }

    /// A cart is never blocked by its own existing hold
    #[test]
    fn test_own_hold_excluded_from_admission() {
        let mut model = HoldModel::new(5);
        assert!(model.reserve(1, 5).is_ok());
        // Same cart moves its hold from 5 down to 3 and back up to 5
        assert!(model.reserve(1, 3).is_ok());
        assert!(model.reserve(1, 5).is_ok());
        // A different cart sees nothing available
        assert!(model.reserve(2, 1).is_err());
    }

    /// Re-reserving replaces the hold instead of stacking a second one
    #[test]
    fn test_reserve_is_upsert_not_append() {
        let mut model = HoldModel::new(10);
        assert!(model.reserve(1, 4).is_ok());
        assert!(model.reserve(1, 6).is_ok());
        assert_eq!(model.total_held(), 6);
    }

    /// Releasing twice is a no-op, not an error
    #[test]
    fn test_release_is_idempotent() {
        let mut model = HoldModel::new(3);
        assert!(model.reserve(1, 2).is_ok());
        model.release(1);
        model.release(1);
        assert_eq!(model.total_held(), 0);
        assert_eq!(model.available_for(2), 3);
    }

    /// An expired hold no longer counts against availability
    #[test]
    fn test_expired_hold_frees_availability() {
        let mut model = HoldModel::new(2);
        assert!(model.reserve(1, 2).is_ok());
        assert_eq!(model.available_for(2), 0);
        // Expiry behaves like a release as far as availability goes
        model.release(1);
        assert_eq!(model.available_for(2), 2);
    }

    /// Conversion consumes the hold and the on-hand quantity together, so
    /// net availability to others is unchanged by the conversion itself
    #[test]
    fn test_conversion_keeps_availability_consistent() {
        let mut model = HoldModel::new(5);
        assert!(model.reserve(1, 2).is_ok());
        let before = model.available_for(2);

        assert!(model.convert(1));

        assert_eq!(model.available_for(2), before);
        assert_eq!(model.on_hand, 3);
    }

    /// Converting the same reservation twice decrements on-hand exactly
    /// once; the second call finds no hold and changes nothing
    #[test]
    fn test_convert_twice_decrements_on_hand_once() {
        let mut model = HoldModel::new(5);
        assert!(model.reserve(1, 2).is_ok());

        assert!(model.convert(1));
        assert_eq!(model.on_hand, 3);
        assert_eq!(model.total_held(), 0);

        assert!(!model.convert(1));
        assert_eq!(model.on_hand, 3);
        assert_eq!(model.total_held(), 0);
    }

    /// A hold taken before the stockable was soft-deleted can still be
    /// released afterwards; only new admissions are refused
    #[test]
    fn test_release_survives_soft_deleted_stockable() {
        let mut model = HoldModel::new(4);
        assert!(model.reserve(1, 3).is_ok());

        model.soft_delete();
        assert!(model.reserve(2, 1).is_err());

        model.release(1);
        assert_eq!(model.total_held(), 0);
        // Releasing again after the delete is still a no-op, not an error
        model.release(1);
        assert_eq!(model.total_held(), 0);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    #[derive(Debug, Clone)]
    enum Op {
        Reserve { cart: u32, quantity: i64 },
        Release { cart: u32 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..6, 1i64..20).prop_map(|(cart, quantity)| Op::Reserve { cart, quantity }),
            (0u32..6).prop_map(|cart| Op::Release { cart }),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Serialized admission: no interleaving of reserves and releases
        /// ever makes the held total exceed on-hand
        #[test]
        fn prop_holds_never_exceed_on_hand(
            on_hand in 0i64..50,
            ops in prop::collection::vec(op_strategy(), 1..60)
        ) {
            let mut model = HoldModel::new(on_hand);
            for op in ops {
                match op {
                    Op::Reserve { cart, quantity } => {
                        let _ = model.reserve(cart, quantity);
                    }
                    Op::Release { cart } => model.release(cart),
                }
                prop_assert!(model.total_held() <= on_hand);
            }
        }

        /// Availability plus holds always accounts for exactly the on-hand
        /// quantity (no units lost or invented)
        #[test]
        fn prop_availability_accounts_for_every_unit(
            on_hand in 0i64..50,
            ops in prop::collection::vec(op_strategy(), 1..60)
        ) {
            let mut model = HoldModel::new(on_hand);
            for op in ops {
                match op {
                    Op::Reserve { cart, quantity } => {
                        let _ = model.reserve(cart, quantity);
                    }
                    Op::Release { cart } => model.release(cart),
                }
            }
            // available_for an uninvolved cart counts every hold; admission
            // guarantees holds never exceed on-hand, so nothing is clamped
            let available = model.available_for(u32::MAX);
            prop_assert_eq!(available + model.total_held(), on_hand);
        }

        /// A successful admission never grants more than what was available
        /// at that moment
        #[test]
        fn prop_admission_respects_ceiling(
            on_hand in 0i64..50,
            cart in 0u32..6,
            quantity in 1i64..100
        ) {
            let mut model = HoldModel::new(on_hand);
            let available = model.available_for(cart);
            let result = model.reserve(cart, quantity);
            prop_assert_eq!(result.is_ok(), quantity <= available);
        }
    }
}
