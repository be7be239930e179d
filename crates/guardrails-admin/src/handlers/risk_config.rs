use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use guardrails_shared::{GuardrailsError, RiskTypeConfig};

pub async fn get_risk_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Json<RiskTypeConfig> {
    Json(state.risk_config_cache.get(ctx.tenant_id).await)
}

pub async fn update_risk_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(mut body): Json<RiskTypeConfig>,
) -> Result<Json<RiskTypeConfig>, ApiError> {
    body.tenant_id = ctx.tenant_id;

    sqlx::query(
        "INSERT INTO risk_type_configs
            (tenant_id, s1_enabled, s2_enabled, s3_enabled, s4_enabled, s5_enabled, s6_enabled,
             s7_enabled, s8_enabled, s9_enabled, s10_enabled, s11_enabled, s12_enabled,
             high_sensitivity_threshold, medium_sensitivity_threshold, low_sensitivity_threshold,
             sensitivity_trigger_level)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
         ON CONFLICT (tenant_id) DO UPDATE SET
             s1_enabled = excluded.s1_enabled, s2_enabled = excluded.s2_enabled,
             s3_enabled = excluded.s3_enabled, s4_enabled = excluded.s4_enabled,
             s5_enabled = excluded.s5_enabled, s6_enabled = excluded.s6_enabled,
             s7_enabled = excluded.s7_enabled, s8_enabled = excluded.s8_enabled,
             s9_enabled = excluded.s9_enabled, s10_enabled = excluded.s10_enabled,
             s11_enabled = excluded.s11_enabled, s12_enabled = excluded.s12_enabled,
             high_sensitivity_threshold = excluded.high_sensitivity_threshold,
             medium_sensitivity_threshold = excluded.medium_sensitivity_threshold,
             low_sensitivity_threshold = excluded.low_sensitivity_threshold,
             sensitivity_trigger_level = excluded.sensitivity_trigger_level",
    )
    .bind(body.tenant_id)
    .bind(body.s1_enabled)
    .bind(body.s2_enabled)
    .bind(body.s3_enabled)
    .bind(body.s4_enabled)
    .bind(body.s5_enabled)
    .bind(body.s6_enabled)
    .bind(body.s7_enabled)
    .bind(body.s8_enabled)
    .bind(body.s9_enabled)
    .bind(body.s10_enabled)
    .bind(body.s11_enabled)
    .bind(body.s12_enabled)
    .bind(body.high_sensitivity_threshold)
    .bind(body.medium_sensitivity_threshold)
    .bind(body.low_sensitivity_threshold)
    .bind(&body.sensitivity_trigger_level)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    state.risk_config_cache.invalidate(ctx.tenant_id).await;
    Ok(Json(body))
}
