use crate::errors::ApiError;
use crate::logging::record_verdict;
use crate::middleware::auth::Authenticated;
use crate::proxy_log;
use crate::state::AppState;
use crate::streaming::{detect_and_relay, DetectionMode, StreamContext};
use crate::upstream;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Response as HttpResponse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardrails_core::data_security::load_entity_types;
use guardrails_core::kb::load_knowledge_bases;
use guardrails_core::pipeline::PipelineVerdict;
use guardrails_shared::{
    resolve_end_user_id, Action, ChatMessage, Direction, GuardrailsError, MessageContent, ProxyRequestStatus,
};
use serde_json::{json, Value};
use std::time::Instant;
use uuid::Uuid;

fn extract_messages(body: &Value, endpoint: &str) -> Result<Vec<ChatMessage>, ApiError> {
    if endpoint == "completions" {
        let prompt = body
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| GuardrailsError::ValidationError("prompt is required".to_string()))?;
        return Ok(vec![ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Text(prompt.to_string()),
        }]);
    }

    let messages = body
        .get("messages")
        .cloned()
        .ok_or_else(|| GuardrailsError::ValidationError("messages is required".to_string()))?;
    serde_json::from_value(messages)
        .map_err(|e| ApiError::from(GuardrailsError::ValidationError(e.to_string())))
}

fn categories_of(verdict: &PipelineVerdict) -> Vec<String> {
    let mut categories = verdict.security.categories.clone();
    categories.extend(verdict.compliance.categories.clone());
    categories.extend(verdict.data.categories.clone());
    categories
}

/// A `sync_serial` input-risk block short-circuits before any upstream call
/// (§4.2 step 3): a single `content_filter` response, or for streaming requests
/// a single SSE chunk carrying the substitute answer followed by `[DONE]`.
fn blocked_response(verdict: &PipelineVerdict, streaming: bool) -> Response {
    let detection_info = json!({
        "suggest_action": verdict.suggest_action,
        "suggest_answer": verdict.suggest_answer,
        "categories": categories_of(verdict),
        "request_id": verdict.request_id,
    });

    if streaming {
        let chunk = json!({
            "id": verdict.request_id,
            "object": "chat.completion.chunk",
            "choices": [{
                "index": 0,
                "delta": {"content": verdict.suggest_answer.clone().unwrap_or_default()},
                "finish_reason": "content_filter",
            }],
            "detection_info": detection_info,
        });
        let sse = format!("data: {chunk}\n\ndata: [DONE]\n\n");
        return HttpResponse::builder()
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .body(Body::from(sse))
            .expect("static response is well-formed")
            .into_response();
    }

    let payload = json!({
        "id": verdict.request_id,
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": verdict.suggest_answer.clone().unwrap_or_default()},
            "finish_reason": "content_filter",
        }],
        "detection_info": detection_info,
    });
    Json(payload).into_response()
}

/// Drives the Proxy Policy Engine end to end for one request (§4.2): model
/// lookup, input inspection, upstream forward, output inspection (or the
/// streaming chunk detector), and the `ProxyRequestLog` write.
async fn chat_like(
    state: AppState,
    tenant_id: Uuid,
    headers: HeaderMap,
    body: Value,
    endpoint: &'static str,
) -> Result<Response, ApiError> {
    let started = Instant::now();

    let requested_model = body.get("model").and_then(Value::as_str).map(str::to_string);
    let cfg = state
        .model_config_cache
        .get(tenant_id, requested_model.as_deref())
        .await
        .ok_or_else(|| GuardrailsError::NotFound("no enabled proxy model config for tenant".to_string()))?;

    let xxai_app_user_id = body
        .get("extra_body")
        .and_then(|v| v.get("xxai_app_user_id"))
        .or_else(|| body.get("xxai_app_user_id"))
        .and_then(Value::as_str);
    let end_user_id = resolve_end_user_id(tenant_id, xxai_app_user_id);

    if let Some(ban) = state.ban_policy.check_user_banned(tenant_id, &end_user_id).await? {
        return Err(GuardrailsError::Banned {
            ban_until: ban.ban_until,
            reason: ban.reason,
        }
        .into());
    }
    if !state.rate_limiter.check_and_increment(tenant_id).await? {
        return Err(GuardrailsError::RateLimited.into());
    }

    let messages_in = extract_messages(&body, endpoint)?;
    let entity_types = load_entity_types(state.db.pool(), tenant_id).await?;
    let knowledge_bases = load_knowledge_bases(state.db.pool(), tenant_id).await.unwrap_or_default();
    let streaming = upstream::is_streaming(&body);

    let input_mode = DetectionMode::for_block_flag(cfg.block_on_input_risk);
    let mut input_detection_id = None;
    let input_blocked;

    match input_mode {
        DetectionMode::SyncSerial => {
            let verdict = state
                .pipeline
                .check(tenant_id, &messages_in, Direction::Input, &entity_types, &knowledge_bases)
                .await;
            record_verdict(&state, tenant_id, &end_user_id, &verdict, Some(&headers));
            input_detection_id = Some(verdict.request_id.clone());

            if matches!(verdict.suggest_action, Action::Reject | Action::Replace) {
                proxy_log::record(
                    &state,
                    &verdict.request_id,
                    tenant_id,
                    cfg.id,
                    input_detection_id.as_deref(),
                    None,
                    true,
                    false,
                    None,
                    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
                    if streaming {
                        ProxyRequestStatus::StreamBlocked
                    } else {
                        ProxyRequestStatus::Blocked
                    },
                )
                .await;

                return Ok(blocked_response(&verdict, streaming));
            }
            input_blocked = false;
        }
        DetectionMode::AsyncBypass => {
            input_blocked = false;
            let pipeline = state.pipeline.clone();
            let messages = messages_in.clone();
            let entity_types_bg = entity_types.clone();
            let knowledge_bases_bg = knowledge_bases.clone();
            let state_bg = state.clone();
            let end_user_id_bg = end_user_id.clone();
            let headers_bg = headers.clone();
            tokio::spawn(async move {
                let verdict = pipeline
                    .check(tenant_id, &messages, Direction::Input, &entity_types_bg, &knowledge_bases_bg)
                    .await;
                record_verdict(&state_bg, tenant_id, &end_user_id_bg, &verdict, Some(&headers_bg));
            });
        }
    }

    let fwd = upstream::build(&cfg, &state.cipher, endpoint, body)?;

    if streaming {
        let response = upstream::send(&state.upstream_http, &fwd).await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GuardrailsError::UpstreamError(format!("{status}: {text}")).into());
        }

        let output_mode = DetectionMode::for_block_flag(cfg.block_on_output_risk);
        let stream_ctx = StreamContext {
            state: state.clone(),
            tenant_id,
            end_user_id: end_user_id.clone(),
            messages_in,
            entity_types,
            knowledge_bases: knowledge_bases.clone(),
            mode: output_mode,
            stream_chunk_size: cfg.stream_chunk_size.max(1),
            enable_reasoning_detection: cfg.enable_reasoning_detection,
            headers: headers.clone(),
        };

        let relayed = detect_and_relay(response.bytes_stream(), stream_ctx);

        let request_id = input_detection_id
            .clone()
            .unwrap_or_else(|| format!("proxy-{}", Uuid::new_v4().simple()));
        tokio::spawn({
            let state = state.clone();
            let proxy_config_id = cfg.id;
            async move {
                proxy_log::record(
                    &state,
                    &request_id,
                    tenant_id,
                    proxy_config_id,
                    input_detection_id.as_deref(),
                    None,
                    input_blocked,
                    false,
                    None,
                    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
                    ProxyRequestStatus::StreamSuccess,
                )
                .await;
            }
        });

        let resp = HttpResponse::builder()
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .body(Body::from_stream(relayed))
            .map_err(|e| GuardrailsError::InternalError(e.to_string()))?;
        return Ok(resp.into_response());
    }

    let response = upstream::send(&state.upstream_http, &fwd).await?;
    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(GuardrailsError::UpstreamError(format!("{status}: {text}")).into());
    }
    let mut payload: Value = response
        .json()
        .await
        .map_err(|e| GuardrailsError::UpstreamError(e.to_string()))?;

    let output_mode = DetectionMode::for_block_flag(cfg.block_on_output_risk);
    let assistant_text = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut output_blocked = false;
    let mut output_detection_id = None;

    match output_mode {
        DetectionMode::SyncSerial => {
            let mut messages = messages_in.clone();
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: MessageContent::Text(assistant_text),
            });
            let verdict = state
                .pipeline
                .check(tenant_id, &messages, Direction::Output, &entity_types, &knowledge_bases)
                .await;
            record_verdict(&state, tenant_id, &end_user_id, &verdict, Some(&headers));
            output_detection_id = Some(verdict.request_id.clone());

            if matches!(verdict.suggest_action, Action::Reject | Action::Replace) {
                output_blocked = true;
                if let Some(obj) = payload.pointer_mut("/choices/0").and_then(Value::as_object_mut) {
                    obj.insert("finish_reason".to_string(), json!("content_filter"));
                    if let Some(message) = obj.get_mut("message").and_then(Value::as_object_mut) {
                        message.insert(
                            "content".to_string(),
                            json!(verdict.suggest_answer.clone().unwrap_or_default()),
                        );
                    }
                    obj.insert(
                        "detection_info".to_string(),
                        json!({
                            "suggest_action": verdict.suggest_action,
                            "suggest_answer": verdict.suggest_answer,
                            "categories": categories_of(&verdict),
                            "request_id": verdict.request_id,
                        }),
                    );
                }
            }
        }
        DetectionMode::AsyncBypass => {
            let pipeline = state.pipeline.clone();
            let mut messages = messages_in.clone();
            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: MessageContent::Text(assistant_text),
            });
            let entity_types_bg = entity_types.clone();
            let knowledge_bases_bg = knowledge_bases.clone();
            let state_bg = state.clone();
            let end_user_id_bg = end_user_id.clone();
            let headers_bg = headers.clone();
            tokio::spawn(async move {
                let verdict = pipeline
                    .check(tenant_id, &messages, Direction::Output, &entity_types_bg, &knowledge_bases_bg)
                    .await;
                record_verdict(&state_bg, tenant_id, &end_user_id_bg, &verdict, Some(&headers_bg));
            });
        }
    }

    let tokens = payload
        .pointer("/usage/total_tokens")
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok());
    let request_id = output_detection_id
        .clone()
        .or_else(|| input_detection_id.clone())
        .unwrap_or_else(|| format!("proxy-{}", Uuid::new_v4().simple()));

    proxy_log::record(
        &state,
        &request_id,
        tenant_id,
        cfg.id,
        input_detection_id.as_deref(),
        output_detection_id.as_deref(),
        input_blocked,
        output_blocked,
        tokens,
        i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        if input_blocked || output_blocked {
            ProxyRequestStatus::Blocked
        } else {
            ProxyRequestStatus::Success
        },
    )
    .await;

    Ok(Json(payload).into_response())
}

pub async fn chat_completions(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    chat_like(state, ctx.tenant_id, headers, body, "chat/completions").await
}

pub async fn completions(
    State(state): State<AppState>,
    Authenticated(ctx): Authenticated,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    chat_like(state, ctx.tenant_id, headers, body, "completions").await
}

pub async fn models(State(state): State<AppState>, Authenticated(ctx): Authenticated) -> Json<Value> {
    let configs = state.model_config_cache.get_all(ctx.tenant_id).await;
    let data: Vec<Value> = configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| json!({ "id": c.config_name, "object": "model", "owned_by": "guardrails-proxy" }))
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_messages_wraps_legacy_prompt_as_a_user_message() {
        let body = json!({"prompt": "hello there", "model": "my-gpt"});
        let messages = extract_messages(&body, "completions").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[0].content.to_plain_text(), "hello there");
    }

    #[test]
    fn extract_messages_requires_prompt_on_the_legacy_endpoint() {
        let body = json!({"model": "my-gpt"});
        assert!(extract_messages(&body, "completions").is_err());
    }

    #[test]
    fn extract_messages_parses_chat_messages_array() {
        let body = json!({
            "model": "my-gpt",
            "messages": [{"role": "user", "content": "hi"}],
        });
        let messages = extract_messages(&body, "chat/completions").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }
}
