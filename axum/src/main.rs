mod api;
mod sim;

use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use zone_spawn::db::SqliteDatabase;
use zone_spawn::ZoneConfig;

const DEFAULT_FILTER: &str = "info,zone_spawn=debug";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// `ZONE_CONFIG` points at a JSON file; defaults otherwise
fn load_config() -> anyhow::Result<ZoneConfig> {
    match std::env::var_os("ZONE_CONFIG") {
        Some(path) => ZoneConfig::from_json_file(&path)
            .with_context(|| format!("loading zone config from {}", path.to_string_lossy())),
        None => Ok(ZoneConfig::default()),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = load_config()?;

    let db = SqliteDatabase::open(config.database_path.as_deref()).context("opening spawn database")?;
    let sim = sim::spawn(config.clone(), Arc::new(db))?;

    let state = api::AppState {
        sim: sim.client(),
        zone_id: config.zone_id,
        started_at: chrono::Utc::now(),
    };
    let app = api::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, zone_id = config.zone_id, "zone spawn server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sim.shutdown();
    Ok(())
}
