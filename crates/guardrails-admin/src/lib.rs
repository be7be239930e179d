pub mod email;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::routing::{delete, get, patch, post, put};
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

    let auth_routes = Router::new()
        .route("/api/v1/auth/verification-code", post(handlers::auth::request_verification_code))
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route("/api/v1/auth/me", get(handlers::auth::me))
        .route("/api/v1/auth/api-key/rotate", post(handlers::auth::rotate_api_key));

    let tenant_switch_routes = Router::new()
        .route("/api/v1/tenant-switch", post(handlers::tenant_switch::start_switch))
        .route("/api/v1/tenant-switch/:session_token", delete(handlers::tenant_switch::end_switch));

    let tenant_routes = Router::new()
        .route("/api/v1/tenants", get(handlers::tenants::list_tenants))
        .route("/api/v1/tenants/:id", get(handlers::tenants::get_tenant))
        .route("/api/v1/tenants/:id", delete(handlers::tenants::delete_tenant))
        .route("/api/v1/tenants/:id/active", patch(handlers::tenants::set_tenant_active));

    let keyword_routes = Router::new()
        .route(
            "/api/v1/blacklists",
            get(handlers::keyword_lists::list_blacklists).post(handlers::keyword_lists::create_blacklist),
        )
        .route(
            "/api/v1/blacklists/:id",
            put(handlers::keyword_lists::update_blacklist).delete(handlers::keyword_lists::delete_blacklist),
        )
        .route(
            "/api/v1/whitelists",
            get(handlers::keyword_lists::list_whitelists).post(handlers::keyword_lists::create_whitelist),
        )
        .route(
            "/api/v1/whitelists/:id",
            put(handlers::keyword_lists::update_whitelist).delete(handlers::keyword_lists::delete_whitelist),
        );

    let template_routes = Router::new()
        .route(
            "/api/v1/templates",
            get(handlers::templates::list_templates).post(handlers::templates::create_template),
        )
        .route(
            "/api/v1/templates/:id",
            put(handlers::templates::update_template).delete(handlers::templates::delete_template),
        );

    let risk_config_routes = Router::new().route(
        "/api/v1/risk-config",
        get(handlers::risk_config::get_risk_config).put(handlers::risk_config::update_risk_config),
    );

    let data_security_routes = Router::new()
        .route(
            "/api/v1/data-security/entity-types",
            get(handlers::data_security::list_entity_types).post(handlers::data_security::create_entity_type),
        )
        .route("/api/v1/data-security/entity-types/:id", delete(handlers::data_security::delete_entity_type));

    let proxy_config_routes = Router::new()
        .route(
            "/api/v1/proxy-configs",
            get(handlers::proxy_configs::list_proxy_configs).post(handlers::proxy_configs::create_proxy_config),
        )
        .route(
            "/api/v1/proxy-configs/:id",
            put(handlers::proxy_configs::update_proxy_config).delete(handlers::proxy_configs::delete_proxy_config),
        );

    let knowledge_base_routes = Router::new()
        .route(
            "/api/v1/knowledge-bases",
            get(handlers::knowledge_base::list_knowledge_bases).post(handlers::knowledge_base::create_knowledge_base),
        )
        .route("/api/v1/knowledge-bases/:id", delete(handlers::knowledge_base::delete_knowledge_base));

    let result_routes = Router::new()
        .route("/api/v1/results/detections", get(handlers::results::list_detection_results))
        .route("/api/v1/results/proxy-logs", get(handlers::results::list_proxy_logs));

    let rate_limit_routes = Router::new().route(
        "/api/v1/rate-limit",
        get(handlers::rate_limit::get_rate_limit).put(handlers::rate_limit::set_rate_limit),
    );

    let ban_policy_routes = Router::new()
        .route(
            "/api/v1/ban-policy",
            get(handlers::ban_policy::get_ban_policy).put(handlers::ban_policy::set_ban_policy),
        )
        .route("/api/v1/ban-records", get(handlers::ban_policy::list_ban_records))
        .route("/api/v1/ban-records/:end_user_id", delete(handlers::ban_policy::unban));

    let media_routes = Router::new()
        .route("/api/v1/media/upload", post(handlers::media::upload_media))
        .route("/api/v1/media/:filename", delete(handlers::media::delete_media))
        .route("/api/v1/media/image/:tenant_id/:filename", get(handlers::media::serve_media));

    let api_routes = Router::new()
        .merge(auth_routes)
        .merge(tenant_switch_routes)
        .merge(tenant_routes)
        .merge(keyword_routes)
        .merge(template_routes)
        .merge(risk_config_routes)
        .merge(data_security_routes)
        .merge(proxy_config_routes)
        .merge(knowledge_base_routes)
        .merge(result_routes)
        .merge(rate_limit_routes)
        .merge(ban_policy_routes)
        .merge(media_routes)
        .layer(axum::middleware::from_fn_with_state(limiter, concurrency_cap_middleware));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/admin/health", get(handlers::health::admin_health))
        .route("/metrics", get(metrics_handler))
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(trace_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
