//! Reader configuration
//!
//! Handles:
//! - Database and collection names in the coordination store
//! - Poll cadence and telemetry scaling
//! - Readout join watchdog interval
//!
//! Everything has a default; a TOML file named by `DAX_READER_CONFIG`
//! overrides individual fields.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "DAX_READER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub database: String,
    pub collections: CollectionNames,
    pub poll_interval_ms: u64,
    /// Divisor applied to data size and buffer length in heartbeats
    pub rate_scale: f64,
    pub join_warn_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub control: String,
    pub status: String,
    pub options: String,
    pub dac_values: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            database: "xenonnt".to_string(),
            collections: CollectionNames::default(),
            poll_interval_ms: 1000,
            rate_scale: 1e6,
            join_warn_secs: 10,
        }
    }
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            control: "control".to_string(),
            status: "status".to_string(),
            options: "options".to_string(),
            dac_values: "dac_values".to_string(),
        }
    }
}

impl ReaderConfig {
    /// Load from `DAX_READER_CONFIG`, falling back to defaults
    pub async fn load() -> Self {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load_from(&path).await,
            Err(_) => Self::default(),
        }
    }

    /// Load from a TOML file. A missing or invalid file is logged and
    /// replaced by the defaults.
    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read config {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match toml::from_str(&content) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Invalid config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn join_warn_interval(&self) -> Duration {
        Duration::from_secs(self.join_warn_secs.max(1))
    }
}
