//! Service configuration loading and validation

use crate::core::connection_pool::PoolConfig;
use crate::core::scheduler::SchedulerConfig;
use crate::error::{AcqError, Result};
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use fieldgate_modbus::modbus::DeviceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Environment variable prefix; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "ACQSRV_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "acqsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `RUST_LOG` nor `--log-level` is set
    pub level: Option<String>,
    /// Directory of the daily log file; unset disables file logging
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            dir: Some("logs".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Capacity of the delivery queue
    pub queue_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub pool: PoolConfig,
    pub scheduler: SchedulerConfig,
    pub sink: SinkConfig,
    pub devices: Vec<DeviceDescriptor>,
}

impl AppConfig {
    /// Load from a YAML, TOML or JSON file, then apply `ACQSRV_*` overrides
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        if !path.exists() {
            return Err(AcqError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AcqError::config("Invalid file extension"))?;

        let figment = match extension {
            "json" => Figment::new().merge(Json::file(path)),
            "toml" => Figment::new().merge(Toml::file(path)),
            "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
            _ => {
                return Err(AcqError::config(format!(
                    "Unsupported config format: {extension}"
                )))
            },
        };

        let config: AppConfig = figment
            .merge(Env::prefixed(env_prefix).split("__"))
            .extract()?;

        debug!(
            "Loaded {} device(s) from {}",
            config.devices.len(),
            path.display()
        );
        Ok(config)
    }

    /// Reject configurations the service cannot run with
    ///
    /// Register-level problems are logged; those registers are skipped at
    /// poll time.
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_size == 0 {
            return Err(AcqError::config("pool.max_size must be at least 1"));
        }
        if self.scheduler.tick_interval_ms == 0 {
            return Err(AcqError::config(
                "scheduler.tick_interval_ms must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.id.as_str()) {
                return Err(AcqError::config(format!(
                    "Duplicate device id: {}",
                    device.id
                )));
            }
            if !device.is_well_formed() {
                warn!("Device {} has no target or no registers", device.id);
            }
            for register in &device.registers {
                if let Err(e) = register.validate_address_range() {
                    warn!("Device {}: {}", device.id, e);
                }
            }
        }
        Ok(())
    }

    pub fn register_count(&self) -> usize {
        self.devices.iter().map(|d| d.registers.len()).sum()
    }
}
