use crate::errors::ApiError;
use crate::middleware::auth::SuperAdmin;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use guardrails_shared::{GuardrailsError, Tenant};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

/// Lists every tenant (super-admin only, §3 "Roles").
pub async fn list_tenants(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 200);
    let offset = (page - 1) * page_size;

    let tenants = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
         FROM tenants ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(page_size)
    .bind(offset)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tenants")
        .fetch_one(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    Ok(Json(json!({ "items": tenants, "total": total, "page": page, "page_size": page_size })))
}

pub async fn get_tenant(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = sqlx::query_as::<_, Tenant>(
        "SELECT id, email, password_hash, api_key, is_active, is_verified, is_super_admin, created_at, updated_at
         FROM tenants WHERE id = $1",
    )
    .bind(tenant_id)
    .fetch_optional(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?
    .ok_or(GuardrailsError::TenantNotFound)?;

    Ok(Json(tenant))
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_tenant_active(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
    Path(tenant_id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("UPDATE tenants SET is_active = $1, updated_at = now() WHERE id = $2")
        .bind(body.is_active)
        .bind(tenant_id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    if result.rows_affected() == 0 {
        return Err(GuardrailsError::TenantNotFound.into());
    }

    Ok(Json(json!({ "message": "updated" })))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    SuperAdmin(_ctx): SuperAdmin,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(tenant_id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    if result.rows_affected() == 0 {
        return Err(GuardrailsError::TenantNotFound.into());
    }

    Ok(Json(json!({ "message": "deleted" })))
}
