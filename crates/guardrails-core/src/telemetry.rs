use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry as TracingRegistry};

/// Initialize structured logging for a service process. Mirrors the teacher's
/// `tracing-subscriber` setup (env-filter + fmt) with the OTLP/otel export pipeline
/// dropped (see DESIGN.md "Dropped teacher dependencies").
pub fn init_telemetry(service_name: &'static str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{service_name}=info,tower_http=info")));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    TracingRegistry::default()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    init_metrics(service_name)?;

    tracing::info!(service = service_name, "telemetry initialized");
    Ok(())
}

pub fn shutdown_telemetry() {
    tracing::info!("shutting down telemetry");
}

pub struct Metrics {
    pub requests: IntCounterVec,
    pub errors: IntCounterVec,
    pub duration: Histogram,
    pub detections: IntCounterVec,
    pub registry: Registry,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn init_metrics(service_name: &str) -> anyhow::Result<()> {
    let registry = Registry::new();

    let requests = IntCounterVec::new(
        Opts::new("requests_total", "Total number of API requests").namespace(service_name),
        &["method", "endpoint"],
    )?;
    let errors = IntCounterVec::new(
        Opts::new("errors_total", "Total number of API errors").namespace(service_name),
        &["method", "endpoint", "status"],
    )?;
    let duration = Histogram::with_opts(
        HistogramOpts::new("request_duration_seconds", "Request duration in seconds")
            .namespace(service_name),
    )?;
    let detections = IntCounterVec::new(
        Opts::new("detections_total", "Total inspections by action").namespace(service_name),
        &["action", "risk_level"],
    )?;

    registry.register(Box::new(requests.clone()))?;
    registry.register(Box::new(errors.clone()))?;
    registry.register(Box::new(duration.clone()))?;
    registry.register(Box::new(detections.clone()))?;

    METRICS
        .set(Metrics {
            requests,
            errors,
            duration,
            detections,
            registry,
        })
        .map_err(|_| anyhow::anyhow!("metrics already initialized"))?;

    Ok(())
}

pub fn metrics() -> &'static Metrics {
    METRICS.get().expect("metrics not initialized")
}

pub fn get_metrics_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = metrics().registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// HTTP tracing + metrics middleware, the generalized form of the teacher's
/// `trace_middleware` (method/endpoint/status labels, request duration histogram).
pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let matched_path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let m = metrics();
    m.requests.with_label_values(&[&method, &matched_path]).inc();

    let response = next.run(req).await;

    let elapsed = start.elapsed().as_secs_f64();
    m.duration.observe(elapsed);

    let status = response.status().as_u16();
    if status >= 400 {
        m.errors
            .with_label_values(&[&method, &matched_path, &status.to_string()])
            .inc();
    }

    response
}
