use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use guardrails_shared::{GuardrailsError, ResponseTemplate, RiskLevel};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Lists response templates visible to the caller: its own tenant-specific
/// templates plus every global (`tenant_id IS NULL`) template (§4.5/§4.2).
pub async fn list_templates(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<Vec<ResponseTemplate>>, ApiError> {
    let rows = sqlx::query_as::<_, ResponseTemplate>(
        "SELECT id, tenant_id, category, risk_level, template_content, is_default, is_active
         FROM response_templates WHERE tenant_id = $1 OR tenant_id IS NULL
         ORDER BY category",
    )
    .bind(ctx.tenant_id)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct UpsertTemplate {
    pub category: String,
    pub risk_level: RiskLevel,
    pub template_content: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Writing a global template (`tenant_id = NULL`) requires super-admin; set
    /// this to request one (§3 "Roles").
    #[serde(default)]
    pub global: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_template(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertTemplate>,
) -> Result<Json<ResponseTemplate>, ApiError> {
    if body.global && !ctx.is_super_admin {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }
    let tenant_id = if body.global { None } else { Some(ctx.tenant_id) };

    let row = sqlx::query_as::<_, ResponseTemplate>(
        "INSERT INTO response_templates (id, tenant_id, category, risk_level, template_content, is_default, is_active)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id, tenant_id, category, risk_level, template_content, is_default, is_active",
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(&body.category)
    .bind(body.risk_level)
    .bind(&body.template_content)
    .bind(body.is_default)
    .bind(body.is_active)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    state.template_cache.invalidate().await;
    Ok(Json(row))
}

pub async fn update_template(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
    Json(body): Json<UpsertTemplate>,
) -> Result<Json<ResponseTemplate>, ApiError> {
    let existing = sqlx::query_as::<_, ResponseTemplate>(
        "SELECT id, tenant_id, category, risk_level, template_content, is_default, is_active
         FROM response_templates WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .ok_or_else(|| GuardrailsError::NotFound("response_template".to_string()))?;

    let owns = existing.tenant_id == Some(ctx.tenant_id);
    let is_global = existing.tenant_id.is_none();
    if (is_global && !ctx.is_super_admin) || (!is_global && !owns) {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }

    let row = sqlx::query_as::<_, ResponseTemplate>(
        "UPDATE response_templates SET category = $1, risk_level = $2, template_content = $3,
         is_default = $4, is_active = $5 WHERE id = $6
         RETURNING id, tenant_id, category, risk_level, template_content, is_default, is_active",
    )
    .bind(&body.category)
    .bind(body.risk_level)
    .bind(&body.template_content)
    .bind(body.is_default)
    .bind(body.is_active)
    .bind(id)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    state.template_cache.invalidate().await;
    Ok(Json(row))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let existing = sqlx::query_as::<_, ResponseTemplate>(
        "SELECT id, tenant_id, category, risk_level, template_content, is_default, is_active
         FROM response_templates WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .ok_or_else(|| GuardrailsError::NotFound("response_template".to_string()))?;

    let owns = existing.tenant_id == Some(ctx.tenant_id);
    let is_global = existing.tenant_id.is_none();
    if (is_global && !ctx.is_super_admin) || (!is_global && !owns) {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }

    sqlx::query("DELETE FROM response_templates WHERE id = $1")
        .bind(id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    state.template_cache.invalidate().await;
    Ok(Json(json!({ "message": "deleted" })))
}
