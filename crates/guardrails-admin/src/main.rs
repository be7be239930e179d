use guardrails_core::config::AdminConfig;
use guardrails_core::database::Database;
use guardrails_core::telemetry;
use guardrails_admin::{create_app, state::AppState};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    telemetry::init_telemetry("guardrails_admin")?;

    let config = AdminConfig::from_env();
    config.core.ensure_directories()?;

    let database = Database::new(&config.core.database_url).await?;
    let state = AppState::new(database, config.clone())?;

    spawn_importer_loop(state.importer.clone());

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("guardrails-admin listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    telemetry::shutdown_telemetry();
    result?;
    Ok(())
}

/// Periodically folds completed detection/proxy log files into the database.
fn spawn_importer_loop(importer: std::sync::Arc<guardrails_core::importer::Importer>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            match importer.run_once().await {
                Ok(stats) => {
                    if stats.files_processed > 0 {
                        tracing::info!(?stats, "imported detection logs");
                    }
                }
                Err(e) => tracing::error!(error = %e, "log import tick failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
    tracing::info!("received shutdown signal");
}
