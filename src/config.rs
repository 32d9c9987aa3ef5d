use std::path::PathBuf;

use crate::error::{PortalError, Result};
use crate::format::DateOrder;

const DEFAULT_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATA_DIR: &str = "database";
const DEFAULT_SESSION_TTL: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Runtime settings for the portal server and CLI.
///
/// Every field has a default; the environment only overrides.
///
/// | variable             | field           |
/// |----------------------|-----------------|
/// | `PORTAL_ADDR`        | `bind_addr`     |
/// | `PORTAL_DATA_DIR`    | `data_dir`      |
/// | `PORTAL_DATE_ORDER`  | `date_order`    |
/// | `PORTAL_SESSION_TTL` | `session_ttl`   |
#[derive(Debug, Clone, PartialEq)]
pub struct PortalConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub date_order: DateOrder,
    /// Idle lifetime of a session logframe, in seconds.
    pub session_ttl: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        PortalConfig {
            bind_addr: DEFAULT_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            date_order: DateOrder::DayFirst,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl PortalConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PortalConfig::default();

        if let Some(addr) = lookup("PORTAL_ADDR").filter(|v| !v.trim().is_empty()) {
            config.bind_addr = addr.trim().to_string();
        }
        if let Some(dir) = lookup("PORTAL_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(order) = lookup("PORTAL_DATE_ORDER") {
            config.date_order = DateOrder::from_name(&order).ok_or_else(|| {
                PortalError::Config(format!(
                    "PORTAL_DATE_ORDER must be 'day-first' or 'month-first', got '{}'",
                    order
                ))
            })?;
        }
        if let Some(ttl) = lookup("PORTAL_SESSION_TTL") {
            config.session_ttl = ttl.trim().parse().map_err(|_| {
                PortalError::Config(format!("PORTAL_SESSION_TTL must be seconds, got '{}'", ttl))
            })?;
        }

        Ok(config)
    }

    pub fn portfolio_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("portfolio.bin.gz")
    }
}
