//! Shopper identity extraction
//!
//! Authentication lives at the API gateway; by the time a request reaches
//! this service it carries an opaque `x-user-id` and/or `x-session-id`
//! header. A request must carry at least one of the two.

use axum::{
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

/// The shopper a request acts on behalf of: a logged-in user, an anonymous
/// session, or both (during login)
#[derive(Debug, Clone)]
pub struct ShopperIdentity {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for ShopperIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = match parts.headers.get("x-user-id") {
            Some(value) => {
                let raw = value.to_str().map_err(|_| bad_header("x-user-id"))?;
                Some(Uuid::parse_str(raw).map_err(|_| bad_header("x-user-id"))?)
            }
            None => None,
        };

        let session_id = match parts.headers.get("x-session-id") {
            Some(value) => {
                let raw = value.to_str().map_err(|_| bad_header("x-session-id"))?;
                shared::validate_session_id(raw).map_err(|_| bad_header("x-session-id"))?;
                Some(raw.to_string())
            }
            None => None,
        };

        if user_id.is_none() && session_id.is_none() {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": {
                        "code": "MISSING_IDENTITY",
                        "message": "Provide an x-user-id or x-session-id header"
                    }
                })),
            ));
        }

        Ok(ShopperIdentity {
            user_id,
            session_id,
        })
    }
}

fn bad_header(name: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": {
                "code": "INVALID_IDENTITY_HEADER",
                "message": format!("Malformed {} header", name)
            }
        })),
    )
}
