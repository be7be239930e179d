use crate::state::AppState;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use guardrails_core::auth::{strip_bearer, AuthContext};
use serde_json::json;

/// Resolved caller identity, extracted once per request (§4.6), mirroring the
/// Detection Service's extractor of the same name.
pub struct Authenticated(pub AuthContext);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let State(state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .expect("AppState extraction is infallible");

        let bearer = parts
            .headers
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(strip_bearer)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "missing authorization header" })),
                )
            })?;

        let switch_session = parts
            .headers
            .get("X-Switch-Session")
            .and_then(|h| h.to_str().ok());

        let ctx = state
            .resolver
            .resolve(bearer, switch_session)
            .await
            .map_err(|e| (StatusCode::UNAUTHORIZED, Json(json!({ "error": e.to_string() }))))?;

        Ok(Authenticated(ctx))
    }
}
