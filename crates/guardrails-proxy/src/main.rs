use guardrails_core::config::ProxyConfig;
use guardrails_core::database::Database;
use guardrails_core::telemetry;
use guardrails_proxy::{create_app, state::AppState};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    telemetry::init_telemetry("guardrails_proxy")?;

    let config = ProxyConfig::from_env();
    config.core.ensure_directories()?;

    let database = Database::new(&config.core.database_url).await?;
    let state = AppState::new(database, config.clone())?;

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("guardrails-proxy listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;

    telemetry::shutdown_telemetry();
    result?;
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
    tracing::info!("received shutdown signal");
}
