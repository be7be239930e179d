use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use guardrails_shared::{DetectionResult, GuardrailsError, ProxyRequestLog};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
    /// Super admins may look at another tenant's results; ignored otherwise.
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
}

fn effective_tenant_id(ctx: &guardrails_core::auth::AuthContext, query: &ListQuery) -> Uuid {
    if ctx.is_super_admin {
        query.tenant_id.unwrap_or(ctx.tenant_id)
    } else {
        ctx.tenant_id
    }
}

/// Paginated read of detection results (§4.9), tenant-scoped unless the caller is
/// a super admin with an explicit `tenant_id` query param.
pub async fn list_detection_results(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = effective_tenant_id(&ctx, &query);
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 200);
    let offset = (page - 1) * page_size;

    let rows = sqlx::query_as::<_, DetectionResult>(
        "SELECT request_id, tenant_id, content, suggest_action, suggest_answer,
                security_risk_level, security_categories, compliance_risk_level, compliance_categories,
                data_risk_level, data_categories, sensitivity_level, sensitivity_score,
                has_image, image_count, image_paths, hit_keywords, model_response,
                ip_address, user_agent, created_at
         FROM detection_results WHERE tenant_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM detection_results WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    Ok(Json(json!({ "items": rows, "total": total, "page": page, "page_size": page_size })))
}

/// Paginated read of proxy request logs (§4.9).
pub async fn list_proxy_logs(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = effective_tenant_id(&ctx, &query);
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 200);
    let offset = (page - 1) * page_size;

    let rows = sqlx::query_as::<_, ProxyRequestLog>(
        "SELECT request_id, tenant_id, proxy_config_id, input_detection_id, output_detection_id,
                input_blocked, output_blocked, tokens, response_time_ms, status, created_at
         FROM proxy_request_logs WHERE tenant_id = $1
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(tenant_id)
    .bind(page_size)
    .bind(offset)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM proxy_request_logs WHERE tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    Ok(Json(json!({ "items": rows, "total": total, "page": page, "page_size": page_size })))
}
