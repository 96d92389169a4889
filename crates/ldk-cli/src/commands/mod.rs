//! Command handlers for the ldk CLI.
//!
//! Shared setup lives here; order commands live in `order.rs`.

pub mod order;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use ldk_config::{
    report_unused_keys, AppConfig, ConfigConsumer, LoadedConfig, UnusedKeyPolicy,
    ENV_CONFIG_PATHS,
};
use ldk_orders::{OrderController, OrderPolicy};
use tracing::warn;

/// Config layers from `--config`, else `LDK_CONFIG`, else built-in defaults.
pub fn load_config(config_paths: &[String]) -> Result<LoadedConfig> {
    if !config_paths.is_empty() {
        let refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
        return ldk_config::load_layered_yaml(&refs);
    }
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(raw) => {
            let refs: Vec<&str> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            ldk_config::load_layered_yaml(&refs)
        }
        Err(_) => ldk_config::load_layered_yaml_from_strings(&[]),
    }
}

pub fn app_config(config_paths: &[String]) -> Result<AppConfig> {
    let loaded = load_config(config_paths)?;
    let report = report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !report.is_clean() {
        warn!(unused = ?report.unused_leaf_pointers, "config contains keys the cli does not read");
    }
    loaded.app_config()
}

pub fn policy_from(cfg: &AppConfig) -> OrderPolicy {
    OrderPolicy {
        default_state_cap: cfg.allocation.default_state_cap,
        one_time_marker: cfg.guard.one_time_marker.clone(),
        page_size: cfg.display.page_size,
    }
}

/// Everything a DB-backed command needs.
pub struct CliContext {
    pub orders: OrderController,
    pub display_tz: Tz,
}

impl CliContext {
    pub async fn connect(config_paths: &[String]) -> Result<Self> {
        let cfg = app_config(config_paths)?;
        Self::connect_with(&cfg).await
    }

    pub async fn connect_with(cfg: &AppConfig) -> Result<Self> {
        let url = std::env::var(ldk_db::ENV_DB_URL)
            .map_err(|_| anyhow::anyhow!("missing env var {}", ldk_db::ENV_DB_URL))?;
        let pool = ldk_db::connect(&url, cfg.database.max_connections).await?;
        Ok(Self {
            orders: OrderController::new(pool, policy_from(cfg)),
            display_tz: cfg.display_tz()?,
        })
    }
}

pub fn local_time(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %-I:%M %p %Z").to_string()
}
