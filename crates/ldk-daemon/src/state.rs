//! Shared state for ldk-daemon handlers.

use anyhow::Result;
use chrono_tz::Tz;
use ldk_config::AppConfig;
use ldk_orders::{OrderController, OrderPolicy};
use sqlx::PgPool;

/// Static build metadata included in the health response.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Handed to every handler as `State<Arc<AppState>>`.
#[derive(Clone, Debug)]
pub struct AppState {
    pub build: BuildInfo,
    pub orders: OrderController,
    /// Zone used for the `*_display` timestamp fields.
    pub display_tz: Tz,
}

impl AppState {
    pub fn new(pool: PgPool, cfg: &AppConfig) -> Result<Self> {
        let policy = OrderPolicy {
            default_state_cap: cfg.allocation.default_state_cap,
            one_time_marker: cfg.guard.one_time_marker.clone(),
            page_size: cfg.display.page_size,
        };
        Ok(Self {
            build: BuildInfo {
                service: "ldk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            orders: OrderController::new(pool, policy),
            display_tz: cfg.display_tz()?,
        })
    }
}
