//! Typed configuration view.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { max_connections: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Cap applied to states without an explicit threshold.
    pub default_state_cap: i64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_state_cap: 999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub one_time_marker: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            one_time_marker: "One Time".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA zone name used when rendering timestamps for people.
    pub timezone: String,
    pub page_size: i64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            page_size: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_any_origin: bool,
    /// Used only when `allow_any_origin` is false.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub allocation: AllocationConfig,
    pub guard: GuardConfig,
    pub display: DisplayConfig,
    pub cors: CorsConfig,
}

impl AppConfig {
    /// Deserialize from the merged config document and validate. Unknown keys
    /// are tolerated here; see `report_unused_keys`.
    pub fn from_json(v: &Value) -> Result<Self> {
        let cfg: AppConfig =
            serde_json::from_value(v.clone()).context("config does not match AppConfig")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.allocation.default_state_cap <= 0 {
            bail!(
                "CONFIG_INVALID allocation.default_state_cap must be > 0 (got {})",
                self.allocation.default_state_cap
            );
        }
        if self.display.page_size <= 0 {
            bail!(
                "CONFIG_INVALID display.page_size must be > 0 (got {})",
                self.display.page_size
            );
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be > 0");
        }
        self.display_tz()?;
        Ok(())
    }

    pub fn display_tz(&self) -> Result<Tz> {
        self.display
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("CONFIG_INVALID display.timezone {:?}: {}", self.display.timezone, e))
    }
}
