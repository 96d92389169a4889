//! ldk-daemon entry point.
//!
//! Sets up tracing, loads layered config, connects to Postgres, wires
//! middleware and serves the router until Ctrl-C.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use ldk_config::{
    report_unused_keys, AppConfig, ConfigConsumer, CorsConfig, LoadedConfig, UnusedKeyPolicy,
    ENV_CONFIG_PATHS, ENV_DAEMON_ADDR,
};
use ldk_daemon::{routes, state};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = load_config()?;
    let report = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config contains keys the daemon does not read");
    }
    let cfg = loaded.app_config()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let url = std::env::var(ldk_db::ENV_DB_URL)
        .with_context(|| format!("missing env var {}", ldk_db::ENV_DB_URL))?;
    let pool = ldk_db::connect(&url, cfg.database.max_connections).await?;
    let st = ldk_db::status(&pool).await?;
    if !st.has_orders_table {
        warn!("lead_orders table missing; run `ldk db migrate`");
    }

    let shared = Arc::new(state::AppState::new(pool, &cfg)?);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&cfg.cors));

    let addr = bind_addr(&cfg)?;
    info!("ldk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Layers from `LDK_CONFIG` (comma-separated paths); built-in defaults when unset.
fn load_config() -> anyhow::Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(raw) => {
            let paths: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            ldk_config::load_layered_yaml(&paths)
        }
        Err(_) => ldk_config::load_layered_yaml_from_strings(&[]),
    }
}

/// `LDK_DAEMON_ADDR` wins over `server.bind_addr`.
fn bind_addr(cfg: &AppConfig) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var(ENV_DAEMON_ADDR).unwrap_or_else(|_| cfg.server.bind_addr.clone());
    raw.parse()
        .with_context(|| format!("invalid bind address: {raw}"))
}

fn cors_layer(cfg: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if cfg.allow_any_origin {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cfg
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(origins)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
