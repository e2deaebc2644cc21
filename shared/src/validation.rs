//! Validation utilities for the Storefront Platform

/// Validate a cart line or reservation quantity (strictly positive)
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a manual stock adjustment delta (non-zero, bounded)
pub fn validate_adjustment_delta(delta: i64) -> Result<(), &'static str> {
    if delta == 0 {
        return Err("Adjustment delta must be non-zero");
    }
    if delta.abs() > 1_000_000 {
        return Err("Adjustment delta out of range");
    }
    Ok(())
}

/// Validate an opaque session identifier
pub fn validate_session_id(session_id: &str) -> Result<(), &'static str> {
    if session_id.is_empty() {
        return Err("Session id must not be empty");
    }
    if session_id.len() > 255 {
        return Err("Session id too long");
    }
    Ok(())
}

/// A cart is owned by a user id or a session id, never both and never neither
pub fn validate_cart_owner(
    user_id: Option<uuid::Uuid>,
    session_id: Option<&str>,
) -> Result<(), &'static str> {
    match (user_id, session_id) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (Some(_), Some(_)) => Err("Cart cannot belong to both a user and a session"),
        (None, None) => Err("Cart must belong to a user or a session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_positive() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn adjustment_delta_nonzero_and_bounded() {
        assert!(validate_adjustment_delta(-5).is_ok());
        assert!(validate_adjustment_delta(0).is_err());
        assert!(validate_adjustment_delta(2_000_000).is_err());
    }

    #[test]
    fn cart_owner_is_exclusive() {
        let user = Some(uuid::Uuid::new_v4());
        assert!(validate_cart_owner(user, None).is_ok());
        assert!(validate_cart_owner(None, Some("sess")).is_ok());
        assert!(validate_cart_owner(user, Some("sess")).is_err());
        assert!(validate_cart_owner(None, None).is_err());
    }

    #[test]
    fn session_id_bounds() {
        assert!(validate_session_id("abc").is_ok());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"x".repeat(256)).is_err());
    }
}
