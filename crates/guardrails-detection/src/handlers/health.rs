use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn guardrails_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "concurrency": {
            "max_concurrent_requests": state.config.max_concurrent_requests,
        },
    }))
}

pub async fn models() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [
            { "id": guardrails_core::classifier::TEXT_MODEL, "object": "model" },
            { "id": guardrails_core::classifier::VISION_MODEL, "object": "model" },
        ],
    }))
}
