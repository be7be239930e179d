use crate::errors::ApiError;
use crate::middleware::auth::Authenticated;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use guardrails_core::data_security::load_entity_types;
use guardrails_core::kb::load_knowledge_bases;
use guardrails_shared::{
    resolve_end_user_id, ChatMessage, ContentPart, Direction, GuardrailResponse, GuardrailsError,
    GuardrailsInputRequest, GuardrailsOutputRequest, GuardrailsRequest, MessageContent,
};
use serde_json::json;

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers.get("User-Agent").and_then(|v| v.to_str().ok()).map(str::to_string)
}

/// Saves every inbound image part to disk (§4.4) for detection-record bookkeeping;
/// failures are logged and skipped rather than failing the whole inspection.
async fn save_images(state: &AppState, tenant_id: uuid::Uuid, messages: &[ChatMessage]) -> Vec<String> {
    let mut saved = Vec::new();
    for message in messages {
        let MessageContent::Parts(parts) = &message.content else {
            continue;
        };
        for part in parts {
            let ContentPart::ImageUrl { image_url } = part else {
                continue;
            };
            match state.image_processor.process(&image_url.url, tenant_id).await {
                Ok(processed) => saved.extend(processed.saved_path),
                Err(e) => tracing::warn!(error = %e, "failed to save inspected image"),
            }
        }
    }
    saved
}

/// Inspects one request end-to-end: rate limit, ban check, pipeline, async log,
/// ban-trigger bookkeeping (§4.1, §4.7, §4.8).
async fn inspect(
    state: &AppState,
    tenant_id: uuid::Uuid,
    end_user_id: &str,
    messages: &[ChatMessage],
    direction: Direction,
    headers: &HeaderMap,
) -> Result<GuardrailResponse, ApiError> {
    if !state.rate_limiter.check_and_increment(tenant_id).await? {
        return Err(GuardrailsError::RateLimited.into());
    }

    if let Some(ban) = state.ban_policy.check_user_banned(tenant_id, end_user_id).await? {
        return Err(GuardrailsError::Banned {
            ban_until: ban.ban_until,
            reason: ban.reason,
        }
        .into());
    }

    let entity_types = load_entity_types(state.db.pool(), tenant_id).await?;
    let knowledge_bases = load_knowledge_bases(state.db.pool(), tenant_id).await.unwrap_or_default();
    let verdict = state.pipeline.check(tenant_id, messages, direction, &entity_types, &knowledge_bases).await;
    let image_paths = save_images(state, tenant_id, messages).await;

    let record = json!({
        "request_id": verdict.request_id,
        "tenant_id": tenant_id,
        "content": verdict.content,
        "suggest_action": verdict.suggest_action,
        "suggest_answer": verdict.suggest_answer,
        "security_risk_level": verdict.security.risk_level,
        "security_categories": verdict.security.categories,
        "compliance_risk_level": verdict.compliance.risk_level,
        "compliance_categories": verdict.compliance.categories,
        "data_risk_level": verdict.data.risk_level,
        "data_categories": verdict.data.categories,
        "sensitivity_level": verdict.sensitivity_level,
        "sensitivity_score": verdict.sensitivity_score,
        "has_image": verdict.has_image,
        "image_count": image_paths.len() as i64,
        "image_paths": image_paths,
        "hit_keywords": verdict.hit_keywords,
        "model_response": verdict.model_response,
        "ip_address": client_ip(headers),
        "user_agent": user_agent(headers),
    });
    state.logger.log_detection(record);

    let ban_policy = state.ban_policy.clone();
    let overall = verdict.overall_risk_level;
    let request_id = verdict.request_id.clone();
    let end_user_id = end_user_id.to_string();
    tokio::spawn(async move {
        if let Err(e) = ban_policy
            .check_and_apply(tenant_id, &end_user_id, overall, Some(&request_id))
            .await
        {
            tracing::error!(error = %e, "ban policy bookkeeping failed");
        }
    });

    Ok(verdict.to_response())
}

pub async fn check_messages(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    headers: HeaderMap,
    Json(req): Json<GuardrailsRequest>,
) -> Result<Json<GuardrailResponse>, ApiError> {
    if req.messages.is_empty() {
        return Err(GuardrailsError::ValidationError("messages must not be empty".into()).into());
    }

    let xxai_app_user_id = req
        .extra_body
        .as_ref()
        .and_then(|v| v.get("xxai_app_user_id"))
        .and_then(|v| v.as_str());
    let end_user_id = resolve_end_user_id(ctx.tenant_id, xxai_app_user_id);

    let response = inspect(&state, ctx.tenant_id, &end_user_id, &req.messages, Direction::Input, &headers).await?;
    Ok(Json(response))
}

pub async fn check_input(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    headers: HeaderMap,
    Json(req): Json<GuardrailsInputRequest>,
) -> Result<Json<GuardrailResponse>, ApiError> {
    if req.input.trim().is_empty() {
        return Err(GuardrailsError::ValidationError("input must not be empty".into()).into());
    }

    let end_user_id = resolve_end_user_id(ctx.tenant_id, req.xxai_app_user_id.as_deref());
    let messages = vec![ChatMessage {
        role: "user".to_string(),
        content: MessageContent::Text(req.input),
    }];

    let response = inspect(&state, ctx.tenant_id, &end_user_id, &messages, Direction::Input, &headers).await?;
    Ok(Json(response))
}

pub async fn check_output(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    headers: HeaderMap,
    Json(req): Json<GuardrailsOutputRequest>,
) -> Result<Json<GuardrailResponse>, ApiError> {
    if req.output.trim().is_empty() {
        return Err(GuardrailsError::ValidationError("output must not be empty".into()).into());
    }

    let end_user_id = resolve_end_user_id(ctx.tenant_id, req.xxai_app_user_id.as_deref());
    let messages = vec![
        ChatMessage { role: "user".to_string(), content: MessageContent::Text(req.input) },
        ChatMessage { role: "assistant".to_string(), content: MessageContent::Text(req.output) },
    ];

    let response = inspect(&state, ctx.tenant_id, &end_user_id, &messages, Direction::Output, &headers).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.1, 10.0.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.1"));
    }

    #[test]
    fn client_ip_absent_without_header() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
