use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use guardrails_shared::{GuardrailsError, UserRateLimit};
use serde::Deserialize;

pub async fn get_rate_limit(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<UserRateLimit>, ApiError> {
    let row = sqlx::query_as::<_, UserRateLimit>(
        "SELECT tenant_id, requests_per_second, is_active FROM user_rate_limits WHERE tenant_id = $1",
    )
    .bind(ctx.tenant_id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .unwrap_or(UserRateLimit {
        tenant_id: ctx.tenant_id,
        requests_per_second: 0,
        is_active: true,
    });

    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct SetRateLimitRequest {
    pub requests_per_second: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn set_rate_limit(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<SetRateLimitRequest>,
) -> Result<Json<UserRateLimit>, ApiError> {
    sqlx::query(
        "INSERT INTO user_rate_limits (tenant_id, requests_per_second, is_active)
         VALUES ($1, $2, $3)
         ON CONFLICT (tenant_id) DO UPDATE SET
            requests_per_second = excluded.requests_per_second, is_active = excluded.is_active",
    )
    .bind(ctx.tenant_id)
    .bind(body.requests_per_second)
    .bind(body.is_active)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(UserRateLimit {
        tenant_id: ctx.tenant_id,
        requests_per_second: body.requests_per_second,
        is_active: body.is_active,
    }))
}
