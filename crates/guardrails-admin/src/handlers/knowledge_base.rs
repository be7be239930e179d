use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use guardrails_shared::{GuardrailsError, KnowledgeBase};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Lists knowledge bases visible to the caller: its own plus every global one
/// (§4.1 step 7's pluggable retriever).
pub async fn list_knowledge_bases(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
) -> Result<Json<Vec<KnowledgeBase>>, ApiError> {
    let rows = sqlx::query_as::<_, KnowledgeBase>(
        "SELECT id, tenant_id, category, file_path, vector_file_path, total_qa_pairs, is_active, is_global
         FROM knowledge_bases WHERE tenant_id = $1 OR is_global = true
         ORDER BY category",
    )
    .bind(ctx.tenant_id)
    .fetch_all(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct UpsertKnowledgeBase {
    pub category: String,
    pub file_path: String,
    pub vector_file_path: String,
    #[serde(default)]
    pub total_qa_pairs: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_global: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_knowledge_base(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertKnowledgeBase>,
) -> Result<Json<KnowledgeBase>, ApiError> {
    if body.is_global && !ctx.is_super_admin {
        return Err(GuardrailsError::AuthorizationFailed.into());
    }

    let row = sqlx::query_as::<_, KnowledgeBase>(
        "INSERT INTO knowledge_bases (id, tenant_id, category, file_path, vector_file_path, total_qa_pairs, is_active, is_global)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, tenant_id, category, file_path, vector_file_path, total_qa_pairs, is_active, is_global",
    )
    .bind(Uuid::new_v4())
    .bind(ctx.tenant_id)
    .bind(&body.category)
    .bind(&body.file_path)
    .bind(&body.vector_file_path)
    .bind(body.total_qa_pairs)
    .bind(body.is_active)
    .bind(body.is_global)
    .fetch_one(state.db.pool())
    .await
    .map_err(GuardrailsError::from)?;

    Ok(Json(row))
}

pub async fn delete_knowledge_base(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let result = sqlx::query("DELETE FROM knowledge_bases WHERE id = $1 AND tenant_id = $2")
        .bind(id)
        .bind(ctx.tenant_id)
        .execute(state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;

    if result.rows_affected() == 0 {
        return Err(GuardrailsError::NotFound("knowledge_base".to_string()).into());
    }

    Ok(Json(json!({ "message": "deleted" })))
}
