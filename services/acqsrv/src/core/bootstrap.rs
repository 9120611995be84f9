//! Service Bootstrap and Initialization
//!
//! This module handles service initialization including:
//! - Command-line parsing
//! - Logging configuration
//! - Configuration loading and validation

use std::path::{Path, PathBuf};

use clap::Parser;
use common::logging::LogConfig;
use errors::GatewayResult;
use tracing::{debug, info};

use crate::core::config::{AppConfig, LoggingConfig};

/// Command-line arguments for acqsrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "acqsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Modbus Field Acquisition Service",
    long_about = None
)]
pub struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, default_value = "config/acqsrv.yaml")]
    pub config: PathBuf,

    /// Log level or filter directive; overrides the configuration file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

/// Load and validate the configuration named on the command line
pub fn load_configuration(path: &Path) -> GatewayResult<AppConfig> {
    debug!("Loading configuration from {}", path.display());
    let config = AppConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Initialize logging system with command-line arguments
///
/// Filter priority: `RUST_LOG`, then `--log-level`, then `logging.level`.
pub fn initialize_logging(
    args: &Args,
    service_name: &str,
    logging: &LoggingConfig,
) -> GatewayResult<()> {
    let log_config = LogConfig {
        service_name: service_name.to_string(),
        log_dir: logging.dir.as_ref().map(PathBuf::from),
        level: args.log_level.clone().or_else(|| logging.level.clone()),
        ansi: !args.no_color,
    };
    common::logging::init_with_config(log_config)
}

/// Print a summary of the loaded configuration
pub fn validate_configuration(config: &AppConfig) {
    info!("Service: {}", config.service.name);
    info!(
        "Pool: max {} connection(s), idle {}s, age {}s",
        config.pool.max_size, config.pool.max_idle_secs, config.pool.max_age_secs
    );
    info!("Found {} device(s)", config.devices.len());

    for device in &config.devices {
        info!(
            "  Device {}: {} ({:?}, unit {}), {} register(s) every {} ms",
            device.id,
            device.target.endpoint(),
            device.family(),
            device.target.unit_id(),
            device.registers.len(),
            device.effective_refresh().as_millis()
        );
    }

    info!("Configuration validation completed successfully");
}
