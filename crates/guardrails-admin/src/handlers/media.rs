use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardrails_shared::GuardrailsError;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path as StdPath, PathBuf};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Extension to save under (defaults to `png`); the caller already knows the
    /// content type of the raw bytes it's posting.
    #[serde(default)]
    pub ext: Option<String>,
}

/// Accepts a raw image upload and signs a URL for it (§4.4, §8 media surface).
pub async fn upload_media(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.len() > guardrails_core::media::MAX_IMAGE_BYTES {
        return Err(GuardrailsError::ImageError("image exceeds 10 MiB limit".to_string()).into());
    }

    let ext = query.ext.unwrap_or_else(|| "png".to_string());
    let dir = StdPath::new(&state.config.core.media_dir).join(ctx.tenant_id.to_string());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| GuardrailsError::InternalError(format!("creating media dir: {e}")))?;

    let filename = format!("{}.{ext}", Uuid::new_v4());
    let path = dir.join(&filename);
    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| GuardrailsError::InternalError(format!("writing media file: {e}")))?;

    let (token, expires) = state.media_signer.issue(ctx.tenant_id, &filename, None);

    Ok(Json(json!({
        "filename": filename,
        "url": format!("/api/v1/media/image/{}/{}?token={token}&expires={expires}", ctx.tenant_id, filename),
    })))
}

/// Serves a previously saved image, gated on a valid signed URL (§4.4).
pub async fn serve_media(
    State(state): State<AppState>,
    Path((tenant_id, filename)): Path<(Uuid, String)>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let token = params.get("token").ok_or(GuardrailsError::AuthenticationFailed)?;
    let expires: i64 = params
        .get("expires")
        .and_then(|v| v.parse().ok())
        .ok_or(GuardrailsError::AuthenticationFailed)?;

    if !state.media_signer.verify(tenant_id, &filename, expires, token) {
        return Err(GuardrailsError::AuthenticationFailed.into());
    }

    let path: PathBuf = StdPath::new(&state.config.core.media_dir).join(tenant_id.to_string()).join(&filename);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| GuardrailsError::NotFound("media file".to_string()))?;

    let content_type = mime_guess_from_ext(&filename);
    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn mime_guess_from_ext(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tiff" => "image/tiff",
        _ => "image/jpeg",
    }
}

pub async fn delete_media(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    Path(filename): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let path = StdPath::new(&state.config.core.media_dir).join(ctx.tenant_id.to_string()).join(&filename);
    tokio::fs::remove_file(&path)
        .await
        .map_err(|_| GuardrailsError::NotFound("media file".to_string()))?;

    Ok(Json(json!({ "message": "deleted" })))
}
