use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use guardrails_shared::{GuardrailsError, ProxyModelConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// `ProxyModelConfig` with the API key redacted for list/get responses; the
/// ciphertext itself is never sent back to the caller (§3, §9).
#[derive(Debug, Serialize)]
pub struct ProxyModelConfigView {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub config_name: String,
    pub api_base_url: String,
    pub model_name: String,
    pub enabled: bool,
    pub block_on_input_risk: bool,
    pub block_on_output_risk: bool,
    pub enable_reasoning_detection: bool,
    pub stream_chunk_size: i32,
}

impl From<ProxyModelConfig> for ProxyModelConfigView {
    fn from(c: ProxyModelConfig) -> Self {
        Self {
            id: c.id,
            tenant_id: c.tenant_id,
            config_name: c.config_name,
            api_base_url: c.api_base_url,
            model_name: c.model_name,
            enabled: c.enabled,
            block_on_input_risk: c.block_on_input_risk,
            block_on_output_risk: c.block_on_output_risk,
            enable_reasoning_detection: c.enable_reasoning_detection,
            stream_chunk_size: c.stream_chunk_size,
        }
    }
}

pub async fn list_proxy_configs(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<Vec<ProxyModelConfigView>>, ApiError> {
    let rows = sqlx::query_as::<_, ProxyModelConfig>(
        "SELECT id, tenant_id, config_name, api_base_url, api_key_encrypted, model_name, enabled,
                block_on_input_risk, block_on_output_risk, enable_reasoning_detection, stream_chunk_size
         FROM proxy_model_configs WHERE tenant_id = $1 ORDER BY config_name",
    )
    .bind(ctx.tenant_id)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(rows.into_iter().map(ProxyModelConfigView::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpsertProxyConfig {
    pub config_name: String,
    pub api_base_url: String,
    pub api_key: String,
    pub model_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub block_on_input_risk: bool,
    #[serde(default = "default_true")]
    pub block_on_output_risk: bool,
    #[serde(default)]
    pub enable_reasoning_detection: bool,
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: i32,
}

fn default_true() -> bool {
    true
}

fn default_stream_chunk_size() -> i32 {
    50
}

pub async fn create_proxy_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertProxyConfig>,
) -> Result<Json<ProxyModelConfigView>, ApiError> {
    let api_key_encrypted = state.cipher.encrypt(&body.api_key)?;

    let row = sqlx::query_as::<_, ProxyModelConfig>(
        "INSERT INTO proxy_model_configs
            (id, tenant_id, config_name, api_base_url, api_key_encrypted, model_name, enabled,
             block_on_input_risk, block_on_output_risk, enable_reasoning_detection, stream_chunk_size)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id, tenant_id, config_name, api_base_url, api_key_encrypted, model_name, enabled,
                   block_on_input_risk, block_on_output_risk, enable_reasoning_detection, stream_chunk_size",
    )
    .bind(Uuid::new_v4())
    .bind(ctx.tenant_id)
    .bind(&body.config_name)
    .bind(&body.api_base_url)
    .bind(&api_key_encrypted)
    .bind(&body.model_name)
    .bind(body.enabled)
    .bind(body.block_on_input_risk)
    .bind(body.block_on_output_risk)
    .bind(body.enable_reasoning_detection)
    .bind(body.stream_chunk_size)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    state.model_config_cache.invalidate(ctx.tenant_id).await;
    Ok(Json(row.into()))
}

pub async fn update_proxy_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
    Json(body): Json<UpsertProxyConfig>,
) -> Result<Json<ProxyModelConfigView>, ApiError> {
    let api_key_encrypted = state.cipher.encrypt(&body.api_key)?;

    let row = sqlx::query_as::<_, ProxyModelConfig>(
        "UPDATE proxy_model_configs SET config_name = $1, api_base_url = $2, api_key_encrypted = $3,
         model_name = $4, enabled = $5, block_on_input_risk = $6, block_on_output_risk = $7,
         enable_reasoning_detection = $8, stream_chunk_size = $9
         WHERE id = $10 AND tenant_id = $11
         RETURNING id, tenant_id, config_name, api_base_url, api_key_encrypted, model_name, enabled,
                   block_on_input_risk, block_on_output_risk, enable_reasoning_detection, stream_chunk_size",
    )
    .bind(&body.config_name)
    .bind(&body.api_base_url)
    .bind(&api_key_encrypted)
    .bind(&body.model_name)
    .bind(body.enabled)
    .bind(body.block_on_input_risk)
    .bind(body.block_on_output_risk)
    .bind(body.enable_reasoning_detection)
    .bind(body.stream_chunk_size)
    .bind(id)
    .bind(ctx.tenant_id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .ok_or_else(|| GuardrailsError::NotFound("proxy_model_config".to_string()))?;

    state.model_config_cache.invalidate(ctx.tenant_id).await;
    Ok(Json(row.into()))
}

pub async fn delete_proxy_config(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM proxy_model_configs WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(ctx.tenant_id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    if result.rows_affected() == 0 {
        return Err(GuardrailsError::NotFound("proxy_model_config".to_string()).into());
    }

    state.model_config_cache.invalidate(ctx.tenant_id).await;
    Ok(Json(json!({ "message": "deleted" })))
}
