pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod state;

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

    let guardrail_routes = Router::new()
        .route("/v1/guardrails", post(handlers::guardrails::check_messages))
        .route("/v1/guardrails/input", post(handlers::guardrails::check_input))
        .route("/v1/guardrails/output", post(handlers::guardrails::check_output))
        .route("/v1/guardrails/health", get(handlers::health::guardrails_health))
        .route("/v1/guardrails/models", get(handlers::health::models))
        .layer(axum::middleware::from_fn_with_state(limiter, concurrency_cap_middleware));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(metrics_handler))
        .merge(guardrail_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(trace_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
