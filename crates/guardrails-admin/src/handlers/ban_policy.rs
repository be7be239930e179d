use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use guardrails_shared::{BanPolicy, GuardrailsError, RiskLevel, UserBanRecord};
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn get_ban_policy(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<BanPolicy>, ApiError> {
    Ok(Json(state.ban_policy.get_policy(ctx.tenant_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetBanPolicyRequest {
    pub enabled: bool,
    pub risk_level: RiskLevel,
    pub trigger_count: i32,
    pub time_window_minutes: i32,
    pub ban_duration_minutes: i32,
}

pub async fn set_ban_policy(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<SetBanPolicyRequest>,
) -> Result<Json<BanPolicy>, ApiError> {
    sqlx::query(
        "INSERT INTO ban_policies (tenant_id, enabled, risk_level, trigger_count, time_window_minutes, ban_duration_minutes)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (tenant_id) DO UPDATE SET
            enabled = excluded.enabled, risk_level = excluded.risk_level,
            trigger_count = excluded.trigger_count, time_window_minutes = excluded.time_window_minutes,
            ban_duration_minutes = excluded.ban_duration_minutes",
    )
    .bind(ctx.tenant_id)
    .bind(body.enabled)
    .bind(body.risk_level)
    .bind(body.trigger_count)
    .bind(body.time_window_minutes)
    .bind(body.ban_duration_minutes)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(BanPolicy {
        tenant_id: ctx.tenant_id,
        enabled: body.enabled,
        risk_level: body.risk_level,
        trigger_count: body.trigger_count,
        time_window_minutes: body.time_window_minutes,
        ban_duration_minutes: body.ban_duration_minutes,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn list_ban_records(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<UserBanRecord>>, ApiError> {
    let rows = if query.active_only {
        sqlx::query_as::<_, UserBanRecord>(
            "SELECT id, tenant_id, end_user_id, banned_at, ban_until, trigger_count, risk_level, reason, is_active
             FROM user_ban_records WHERE tenant_id = $1 AND is_active = true ORDER BY banned_at DESC",
        )
        .bind(ctx.tenant_id)
        .fetch_all(state.db.pool())
        .await
    } else {
        sqlx::query_as::<_, UserBanRecord>(
            "SELECT id, tenant_id, end_user_id, banned_at, ban_until, trigger_count, risk_level, reason, is_active
             FROM user_ban_records WHERE tenant_id = $1 ORDER BY banned_at DESC",
        )
        .bind(ctx.tenant_id)
        .fetch_all(state.db.pool())
        .await
    }
    .map_err(GuardrailsError::from)?;

    Ok(Json(rows))
}

pub async fn unban(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(end_user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let unbanned = state.ban_policy.unban(ctx.tenant_id, &end_user_id).await?;
    if !unbanned {
        return Err(GuardrailsError::NotFound("active ban".to_string()).into());
    }
    Ok(Json(json!({ "message": "unbanned" })))
}
