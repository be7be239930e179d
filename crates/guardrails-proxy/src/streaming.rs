use crate::state::AppState;
use async_stream::stream;
use axum::http::HeaderMap;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use guardrails_core::pipeline::PipelineVerdict;
use guardrails_shared::{Action, ChatMessage, DataSecurityEntityType, Direction, KnowledgeBase, MessageContent};
use serde_json::{json, Value};
use uuid::Uuid;

/// Per-direction inspection mode (§4.2 "Detection-mode selection"): a
/// `block_on_X_risk` flag of `false` never blocks the data path, `true` can cut it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    AsyncBypass,
    SyncSerial,
}

impl DetectionMode {
    pub fn for_block_flag(block: bool) -> Self {
        if block {
            Self::SyncSerial
        } else {
            Self::AsyncBypass
        }
    }
}

/// Everything the streaming chunk detector needs, independent of the upstream
/// byte stream itself (§4.3).
pub struct StreamContext {
    pub state: AppState,
    pub tenant_id: Uuid,
    pub end_user_id: String,
    pub messages_in: Vec<ChatMessage>,
    pub entity_types: Vec<DataSecurityEntityType>,
    pub knowledge_bases: Vec<KnowledgeBase>,
    pub mode: DetectionMode,
    pub stream_chunk_size: i32,
    pub enable_reasoning_detection: bool,
    pub headers: HeaderMap,
}

struct DetectionInfo {
    suggest_action: Action,
    suggest_answer: Option<String>,
    categories: Vec<String>,
    request_id: String,
}

fn verdict_info(verdict: &PipelineVerdict) -> DetectionInfo {
    let mut categories = verdict.security.categories.clone();
    categories.extend(verdict.compliance.categories.clone());
    categories.extend(verdict.data.categories.clone());
    DetectionInfo {
        suggest_action: verdict.suggest_action,
        suggest_answer: verdict.suggest_answer.clone(),
        categories,
        request_id: verdict.request_id.clone(),
    }
}

fn stop_chunk(info: &DetectionInfo) -> String {
    let payload = json!({
        "id": info.request_id,
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": {},
            "finish_reason": "content_filter",
        }],
        "detection_info": {
            "suggest_action": info.suggest_action,
            "suggest_answer": info.suggest_answer,
            "categories": info.categories,
            "request_id": info.request_id,
        }
    });
    format!("data: {payload}\n\n")
}

fn error_chunk(message: &str) -> String {
    let payload = json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": format!("[error: {message}]")}}],
    });
    format!("data: {payload}\n\n")
}

async fn run_inspection(ctx: &StreamContext, buffer: &str) -> PipelineVerdict {
    let mut messages = ctx.messages_in.clone();
    messages.push(ChatMessage {
        role: "assistant".to_string(),
        content: MessageContent::Text(buffer.to_string()),
    });
    let verdict = ctx
        .state
        .pipeline
        .check(ctx.tenant_id, &messages, Direction::Output, &ctx.entity_types, &ctx.knowledge_bases)
        .await;
    crate::logging::record_verdict(&ctx.state, ctx.tenant_id, &ctx.end_user_id, &verdict, Some(&ctx.headers));
    verdict
}

fn spawn_bypass_inspection(ctx: &StreamContext, buffer: String) {
    let state = ctx.state.clone();
    let tenant_id = ctx.tenant_id;
    let end_user_id = ctx.end_user_id.clone();
    let mut messages = ctx.messages_in.clone();
    let entity_types = ctx.entity_types.clone();
    let knowledge_bases = ctx.knowledge_bases.clone();
    let headers = ctx.headers.clone();
    tokio::spawn(async move {
        messages.push(ChatMessage {
            role: "assistant".to_string(),
            content: MessageContent::Text(buffer),
        });
        let verdict = state
            .pipeline
            .check(tenant_id, &messages, Direction::Output, &entity_types, &knowledge_bases)
            .await;
        crate::logging::record_verdict(&state, tenant_id, &end_user_id, &verdict, Some(&headers));
    });
}

/// Consumes the upstream SSE byte stream and relays an inspected SSE stream to
/// the client (§4.3). `async_bypass` forwards every chunk as it arrives and
/// inspects windows in the background; `sync_serial` holds one chunk back so a
/// content-filter stop can still cancel it before it reaches the client.
pub fn detect_and_relay(
    upstream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    ctx: StreamContext,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    stream! {
        let mut upstream = Box::pin(upstream);
        let mut sse_buf: Vec<u8> = Vec::new();
        let mut window = String::new();
        let mut chunk_count: i32 = 0;
        let mut held_chunk: Option<String> = None;
        let mut should_stop = false;

        'outer: while let Some(item) = upstream.next().await {
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    yield Ok(Bytes::from(error_chunk(&e.to_string())));
                    yield Ok(Bytes::from("data: [DONE]\n\n"));
                    return;
                }
            };
            sse_buf.extend_from_slice(&bytes);

            loop {
                let text = String::from_utf8_lossy(&sse_buf).into_owned();
                let Some(pos) = text.find("\n\n") else { break };
                let event = text[..pos].to_string();
                let consumed = (pos + 2).min(sse_buf.len());
                sse_buf.drain(0..consumed);

                let data_line = event
                    .lines()
                    .find_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")));
                let Some(data) = data_line else { continue };
                let data = data.trim();

                if data == "[DONE]" {
                    continue;
                }

                let Ok(parsed) = serde_json::from_str::<Value>(data) else { continue };
                let delta_content = parsed.pointer("/choices/0/delta/content").and_then(Value::as_str).unwrap_or("");
                let reasoning = if ctx.enable_reasoning_detection {
                    parsed.pointer("/choices/0/delta/reasoning_content").and_then(Value::as_str)
                } else {
                    None
                };

                let mut piece = String::new();
                if let Some(r) = reasoning {
                    if !r.is_empty() {
                        piece.push_str("[reasoning] ");
                        piece.push_str(r);
                    }
                }
                piece.push_str(delta_content);
                window.push_str(&piece);
                chunk_count += 1;

                match ctx.mode {
                    DetectionMode::AsyncBypass => {
                        yield Ok(Bytes::from(format!("data: {data}\n\n")));

                        if chunk_count >= ctx.stream_chunk_size && !window.is_empty() {
                            spawn_bypass_inspection(&ctx, std::mem::take(&mut window));
                            chunk_count = 0;
                        }
                    }
                    DetectionMode::SyncSerial => {
                        if chunk_count >= ctx.stream_chunk_size && !window.is_empty() {
                            let verdict = run_inspection(&ctx, &window).await;
                            window.clear();
                            chunk_count = 0;

                            if matches!(verdict.suggest_action, Action::Reject | Action::Replace) {
                                should_stop = true;
                                held_chunk = None;
                                yield Ok(Bytes::from(stop_chunk(&verdict_info(&verdict))));
                                yield Ok(Bytes::from("data: [DONE]\n\n"));
                                break 'outer;
                            }
                        }

                        if let Some(prev) = held_chunk.take() {
                            yield Ok(Bytes::from(prev));
                        }
                        held_chunk = Some(format!("data: {data}\n\n"));
                    }
                }
            }
        }

        if should_stop {
            return;
        }

        if !window.is_empty() {
            match ctx.mode {
                DetectionMode::AsyncBypass => spawn_bypass_inspection(&ctx, window),
                DetectionMode::SyncSerial => {
                    let verdict = run_inspection(&ctx, &window).await;
                    if matches!(verdict.suggest_action, Action::Reject | Action::Replace) {
                        held_chunk = None;
                        yield Ok(Bytes::from(stop_chunk(&verdict_info(&verdict))));
                        yield Ok(Bytes::from("data: [DONE]\n\n"));
                        return;
                    }
                }
            }
        }

        if let Some(prev) = held_chunk.take() {
            yield Ok(Bytes::from(prev));
        }
        yield Ok(Bytes::from("data: [DONE]\n\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_mode_matches_block_flag_per_direction() {
        assert_eq!(DetectionMode::for_block_flag(false), DetectionMode::AsyncBypass);
        assert_eq!(DetectionMode::for_block_flag(true), DetectionMode::SyncSerial);
    }

    #[test]
    fn stop_chunk_carries_detection_info_and_content_filter_reason() {
        let info = DetectionInfo {
            suggest_action: Action::Reject,
            suggest_answer: Some("sorry, can't help with that".to_string()),
            categories: vec!["S5".to_string()],
            request_id: "guardrails-test".to_string(),
        };
        let chunk = stop_chunk(&info);
        assert!(chunk.starts_with("data: "));
        assert!(chunk.contains("\"finish_reason\":\"content_filter\""));
        assert!(chunk.contains("\"detection_info\""));
        assert!(chunk.ends_with("\n\n"));
    }
}
