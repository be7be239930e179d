use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use guardrails_shared::{GuardrailsError, KeywordList};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Which keyword table a request targets; `blacklists`/`whitelists` share an
/// identical shape, so one handler set serves both (§4.5).
#[derive(Debug, Clone, Copy)]
pub enum ListKind {
    Blacklist,
    Whitelist,
}

impl ListKind {
    fn table(self) -> &'static str {
        match self {
            Self::Blacklist => "blacklists",
            Self::Whitelist => "whitelists",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpsertKeywordList {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

async fn list(state: &AppState, ctx_tenant_id: Uuid, kind: ListKind) -> Result<Vec<KeywordList>, ApiError> {
    let query = format!(
        "SELECT id, tenant_id, name, keywords, is_active, created_at, updated_at
         FROM {} WHERE tenant_id = $1 ORDER BY created_at DESC",
        kind.table()
    );
    let rows = sqlx::query_as::<_, KeywordList>(&query)
        .bind(ctx_tenant_id)
        .fetch_all(&*state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;
    Ok(rows)
}

async fn create(state: &AppState, ctx_tenant_id: Uuid, kind: ListKind, body: UpsertKeywordList) -> Result<KeywordList, ApiError> {
    let query = format!(
        "INSERT INTO {} (id, tenant_id, name, keywords, is_active) VALUES ($1, $2, $3, $4, $5)
         RETURNING id, tenant_id, name, keywords, is_active, created_at, updated_at",
        kind.table()
    );
    let row = sqlx::query_as::<_, KeywordList>(&query)
        .bind(Uuid::new_v4())
        .bind(ctx_tenant_id)
        .bind(&body.name)
        .bind(&body.keywords)
        .bind(body.is_active)
        .fetch_one(&*state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;
    state.keyword_cache.invalidate().await;
    Ok(row)
}

async fn update(
    state: &AppState,
    ctx_tenant_id: Uuid,
    kind: ListKind,
    id: Uuid,
    body: UpsertKeywordList,
) -> Result<KeywordList, ApiError> {
    let query = format!(
        "UPDATE {} SET name = $1, keywords = $2, is_active = $3, updated_at = now()
         WHERE id = $4 AND tenant_id = $5
         RETURNING id, tenant_id, name, keywords, is_active, created_at, updated_at",
        kind.table()
    );
    let row = sqlx::query_as::<_, KeywordList>(&query)
        .bind(&body.name)
        .bind(&body.keywords)
        .bind(body.is_active)
        .bind(id)
        .bind(ctx_tenant_id)
        .fetch_optional(&*state.db.pool())
        .await
        .map_err(GuardrailsError::from)?
        .ok_or_else(|| GuardrailsError::NotFound(kind.table().to_string()))?;
    state.keyword_cache.invalidate().await;
    Ok(row)
}

async fn delete(state: &AppState, ctx_tenant_id: Uuid, kind: ListKind, id: Uuid) -> Result<(), ApiError> {
    let query = format!("DELETE FROM {} WHERE id = $1 AND tenant_id = $2", kind.table());
    let result = sqlx::query(&query)
        .bind(id)
        .bind(ctx_tenant_id)
        .execute(&*state.db.pool())
        .await
        .map_err(GuardrailsError::from)?;
    if result.rows_affected() == 0 {
        return Err(GuardrailsError::NotFound(kind.table().to_string()).into());
    }
    state.keyword_cache.invalidate().await;
    Ok(())
}

pub async fn list_blacklists(State(state): State<AppState>, Authenticated(ctx): Authenticated) -> Result<Json<Vec<KeywordList>>, ApiError> {
    Ok(Json(list(&state, ctx.tenant_id, ListKind::Blacklist).await?))
}

pub async fn create_blacklist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertKeywordList>,
) -> Result<Json<KeywordList>, ApiError> {
    Ok(Json(create(&state, ctx.tenant_id, ListKind::Blacklist, body).await?))
}

pub async fn update_blacklist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
    Json(body): Json<UpsertKeywordList>,
) -> Result<Json<KeywordList>, ApiError> {
    Ok(Json(update(&state, ctx.tenant_id, ListKind::Blacklist, id, body).await?))
}

pub async fn delete_blacklist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    delete(&state, ctx.tenant_id, ListKind::Blacklist, id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}

pub async fn list_whitelists(State(state): State<AppState>, Authenticated(ctx): Authenticated) -> Result<Json<Vec<KeywordList>>, ApiError> {
    Ok(Json(list(&state, ctx.tenant_id, ListKind::Whitelist).await?))
}

pub async fn create_whitelist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Json(body): Json<UpsertKeywordList>,
) -> Result<Json<KeywordList>, ApiError> {
    Ok(Json(create(&state, ctx.tenant_id, ListKind::Whitelist, body).await?))
}

pub async fn update_whitelist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
    Json(body): Json<UpsertKeywordList>,
) -> Result<Json<KeywordList>, ApiError> {
    Ok(Json(update(&state, ctx.tenant_id, ListKind::Whitelist, id, body).await?))
}

pub async fn delete_whitelist(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    delete(&state, ctx.tenant_id, ListKind::Whitelist, id).await?;
    Ok(Json(json!({ "message": "deleted" })))
}
