use crate::errors::ApiError;
use crate::middleware::auth::SuperAdmin;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use guardrails_shared::GuardrailsError;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

const SWITCH_SESSION_TTL_MINUTES: i64 = 60;

fn generate_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[derive(Debug, Deserialize)]
pub struct StartSwitchRequest {
    pub target_tenant_id: Uuid,
}

/// Opens an impersonation session for a super admin onto `target_tenant_id`
/// (§4.6). The returned `session_token` is sent back as `X-Switch-Session` on
/// subsequent requests.
pub async fn start_switch(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Json(body): Json<StartSwitchRequest>,
) -> Result<Json<Value>, ApiError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tenants WHERE id = $1")
        .bind(body.target_tenant_id)
        .fetch_one(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;
    if exists == 0 {
        return Err(GuardrailsError::TenantNotFound.into());
    }

    let session_token = generate_session_token();
    let expires_at = Utc::now() + chrono::Duration::minutes(SWITCH_SESSION_TTL_MINUTES);

    sqlx::query(
        "INSERT INTO tenant_switches (session_token, admin_tenant_id, target_tenant_id, expires_at, is_active)
         VALUES ($1, $2, $3, $4, true)",
    )
    .bind(&session_token)
    .bind(ctx.tenant_id)
    .bind(body.target_tenant_id)
    .bind(expires_at)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    tracing::info!(security = true, event = "tenant_switch_start", admin_tenant_id = %ctx.tenant_id, target_tenant_id = %body.target_tenant_id);

    Ok(Json(json!({ "session_token": session_token, "expires_at": expires_at })))
}

/// Ends an impersonation session early.
pub async fn end_switch(
    State(state): State<AppState>,
    SuperAdmin(ctx): SuperAdmin,
    Path(session_token): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query(
        "UPDATE tenant_switches SET is_active = false WHERE session_token = $1 AND admin_tenant_id = $2",
    )
    .bind(&session_token)
    .bind(ctx.tenant_id)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    if result.rows_affected() == 0 {
        return Err(GuardrailsError::NotFound("switch session".to_string()).into());
    }

    Ok(Json(json!({ "message": "switch session ended" })))
}
