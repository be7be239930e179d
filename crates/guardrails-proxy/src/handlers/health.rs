use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::json;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn proxy_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "concurrency": {
            "max_concurrent_requests": state.config.max_concurrent_requests,
        },
    }))
}
