pub mod errors;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod proxy_log;
pub mod state;
pub mod streaming;
pub mod upstream;

use axum::routing::{get, post};
use axum::Router;
use guardrails_core::concurrency::{concurrency_cap_middleware, ConcurrencyLimiter};
use guardrails_core::telemetry::trace_middleware;
use state::AppState;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

async fn metrics_handler() -> axum::response::Response<String> {
    use axum::http::StatusCode;
    match guardrails_core::telemetry::get_metrics_text() {
        Ok(body) => axum::response::Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(body)
            .unwrap(),
        Err(e) => axum::response::Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(format!("failed to collect metrics: {e}"))
            .unwrap(),
    }
}

pub fn create_app(state: AppState) -> Router {
    let limiter = ConcurrencyLimiter::new(state.config.max_concurrent_requests);

    let proxy_routes = Router::new()
        .route("/v1/chat/completions", post(handlers::chat::chat_completions))
        .route("/v1/completions", post(handlers::chat::completions))
        .route("/v1/models", get(handlers::chat::models))
        .route("/v1/proxy/health", get(handlers::health::proxy_health))
        .layer(axum::middleware::from_fn_with_state(limiter, concurrency_cap_middleware));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))
        .merge(proxy_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(trace_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
