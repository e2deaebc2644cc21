//! Coupon terms, eligibility, and discount math

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Money;

/// Discount carried by a coupon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum CouponDiscount {
    /// Flat amount in cents
    Fixed(Money),
    /// Percentage of the cart subtotal, 0..=100
    Percent(i64),
}

impl CouponDiscount {
    /// Discount applied to a subtotal, never exceeding the subtotal itself
    pub fn amount(&self, subtotal: Money) -> Money {
        let raw = match self {
            CouponDiscount::Fixed(amount) => amount.cents(),
            CouponDiscount::Percent(pct) => subtotal.cents() * pct / 100,
        };
        Money(raw.clamp(0, subtotal.cents()))
    }
}

/// Why a coupon no longer applies to a cart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    Deactivated,
    Expired,
    UsageLimitReached,
    SubtotalBelowMinimum { minimum: Money },
}

/// The fields of a coupon that decide whether it still applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponTerms {
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub usage_count: i64,
    pub minimum_subtotal: Option<Money>,
}

impl CouponTerms {
    /// Check the coupon against the current time and the recalculated cart
    /// subtotal. Checks run in severity order; the first failure wins.
    pub fn eligibility(&self, now: DateTime<Utc>, subtotal: Money) -> Result<(), CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Deactivated);
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(CouponRejection::Expired);
            }
        }
        if let Some(limit) = self.usage_limit {
            if self.usage_count >= limit {
                return Err(CouponRejection::UsageLimitReached);
            }
        }
        if let Some(minimum) = self.minimum_subtotal {
            if subtotal < minimum {
                return Err(CouponRejection::SubtotalBelowMinimum { minimum });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn terms() -> CouponTerms {
        CouponTerms {
            active: true,
            expires_at: None,
            usage_limit: None,
            usage_count: 0,
            minimum_subtotal: None,
        }
    }

    #[test]
    fn valid_coupon_passes() {
        assert!(terms().eligibility(Utc::now(), Money(1000)).is_ok());
    }

    #[test]
    fn deactivated_wins_over_everything() {
        let t = CouponTerms {
            active: false,
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..terms()
        };
        assert_eq!(
            t.eligibility(Utc::now(), Money(0)),
            Err(CouponRejection::Deactivated)
        );
    }

    #[test]
    fn expired_coupon_rejected() {
        let t = CouponTerms {
            expires_at: Some(Utc::now() - Duration::minutes(1)),
            ..terms()
        };
        assert_eq!(
            t.eligibility(Utc::now(), Money(1000)),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn usage_limit_rejected_at_limit() {
        let t = CouponTerms {
            usage_limit: Some(5),
            usage_count: 5,
            ..terms()
        };
        assert_eq!(
            t.eligibility(Utc::now(), Money(1000)),
            Err(CouponRejection::UsageLimitReached)
        );
    }

    #[test]
    fn minimum_subtotal_uses_recalculated_value() {
        let t = CouponTerms {
            minimum_subtotal: Some(Money(5000)),
            ..terms()
        };
        assert!(t.eligibility(Utc::now(), Money(5000)).is_ok());
        assert_eq!(
            t.eligibility(Utc::now(), Money(4999)),
            Err(CouponRejection::SubtotalBelowMinimum {
                minimum: Money(5000)
            })
        );
    }

    #[test]
    fn percent_discount_is_proportional() {
        assert_eq!(CouponDiscount::Percent(10).amount(Money(5000)), Money(500));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        assert_eq!(CouponDiscount::Fixed(Money(2000)).amount(Money(1500)), Money(1500));
    }
}
