use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use guardrails_core::data_security::load_entity_types;
use guardrails_shared::{AnonymizationConfig, AnonymizationMethod, DataSecurityEntityType, GuardrailsError, RecognitionConfig, RiskLevel};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Entity types visible to the caller: tenant-owned plus every global row (§4.3).
pub async fn list_entity_types(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<Vec<DataSecurityEntityType>>, ApiError> {
    let rows = load_entity_types(state.db.pool(), ctx.tenant_id)
        .await
        .map_err(GuardrailsError::from)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct UpsertEntityType {
    pub entity_type: String,
    pub display_name: String,
    pub category: RiskLevel,
    pub recognition_config: RecognitionConfig,
    pub anonymization_method: AnonymizationMethod,
    #[serde(default)]
    pub anonymization_config: AnonymizationConfig,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub global: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_entity_type(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertEntityType>,
) -> Result<Json<DataSecurityEntityType>, ApiError> {
    if body.global && !ctx.is_super_admin {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }
    let tenant_id = if body.global { None } else { Some(ctx.tenant_id) };
    let recognition_config = serde_json::to_value(&body.recognition_config).map_err(|e| {
        GuardrailsError::InternalError(format!("serializing recognition config: {e}"))
    })?;
    let anonymization_config = serde_json::to_value(&body.anonymization_config).map_err(|e| {
        GuardrailsError::InternalError(format!("serializing anonymization config: {e}"))
    })?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO data_security_entity_types
            (id, tenant_id, entity_type, display_name, category, recognition_config,
             anonymization_method, anonymization_config, is_active, is_global)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(id)
    .bind(tenant_id)
    .bind(&body.entity_type)
    .bind(&body.display_name)
    .bind(body.category)
    .bind(&recognition_config)
    .bind(body.anonymization_method)
    .bind(&anonymization_config)
    .bind(body.is_active)
    .bind(body.global)
    .execute(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(DataSecurityEntityType {
        id,
        tenant_id,
        entity_type: body.entity_type,
        display_name: body.display_name,
        category: body.category,
        recognition_config: body.recognition_config,
        anonymization_method: body.anonymization_method,
        anonymization_config: body.anonymization_config,
        is_active: body.is_active,
        is_global: body.global,
    }))
}

pub async fn delete_entity_type(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let (tenant_id, is_global): (Option<Uuid>, bool) =
        sqlx::query_as("SELECT tenant_id, is_global FROM data_security_entity_types WHERE id = $1")
            .bind(id)
            .fetch_optional(state.db.pool())
            .await
            .map_err(GuardrailsError::from)?
            .ok_or_else(|| GuardrailsError::NotFound("data_security_entity_type".to_string()))?;

    let owns = tenant_id == Some(ctx.tenant_id);
    if (is_global && !ctx.is_super_admin) || (!is_global && !owns) {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }

    sqlx::query("DELETE FROM data_security_entity_types WHERE id = $1")
        .bind(id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    Ok(Json(json!({ "message": "deleted" })))
}
