//! Logging setup for gateway services
//!
//! Console output and an optional daily rolling log file share one
//! reloadable `EnvFilter`, so the level can be changed at runtime.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use errors::{GatewayError, GatewayResult};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter producing `timestamp [LEVEL] message`
///
/// Example output: `2025-12-02T00:50:44.809512Z [INFO] TCP connected: 10.0.0.5:502`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// Keeps the non-blocking file writer alive for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used as the log file prefix and default debug target
    pub service_name: String,
    /// Directory for the rolling log file; `None` logs to the console only
    pub log_dir: Option<PathBuf>,
    /// Filter directive used when `RUST_LOG` is not set
    pub level: Option<String>,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "acqsrv".to_string(),
            log_dir: Some(PathBuf::from("logs")),
            level: None,
            ansi: true,
        }
    }
}

/// Filter directive for a configuration; `RUST_LOG` wins when set
fn resolve_filter(config: &LogConfig, rust_log: Option<String>) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| format!("info,{}=debug", config.service_name))
}

/// Initialize the global subscriber
pub fn init_with_config(config: LogConfig) -> GatewayResult<()> {
    let directive = resolve_filter(&config, std::env::var("RUST_LOG").ok());
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| GatewayError::Logging(format!("Invalid log filter '{directive}': {e}")))?;

    let (reload_filter, reload_handle) = reload::Layer::new(env_filter);
    let _ = LOG_FILTER_HANDLE.set(reload_handle);
    let _ = CURRENT_LOG_LEVEL.set(Mutex::new(directive));

    let console_layer = fmt::layer()
        .with_ansi(config.ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", config.service_name));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
            match guards.lock() {
                Ok(mut guards) => guards.push(guard),
                Err(poisoned) => poisoned.into_inner().push(guard),
            }

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed(),
            )
        },
        None => None,
    };

    tracing_subscriber::registry()
        .with(reload_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| GatewayError::Logging(e.to_string()))?;

    Ok(())
}

/// Dynamically set the log filter at runtime
///
/// Accepts a bare level (`"debug"`) or a full directive
/// (`"info,acqsrv=trace"`).
pub fn set_log_level(level: &str) -> GatewayResult<()> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or_else(|| GatewayError::Logging("Logging not initialized".to_string()))?;

    let new_filter = EnvFilter::try_new(level)
        .map_err(|e| GatewayError::Logging(format!("Invalid log level '{level}': {e}")))?;

    handle
        .reload(new_filter)
        .map_err(|e| GatewayError::Logging(format!("Failed to reload log filter: {e}")))?;

    if let Some(current) = CURRENT_LOG_LEVEL.get() {
        if let Ok(mut guard) = current.lock() {
            *guard = level.to_string();
        }
    }

    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Current log filter directive
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_resolve_filter_default() {
        let config = LogConfig::default();
        assert_eq!(resolve_filter(&config, None), "info,acqsrv=debug");
    }

    #[test]
    fn test_resolve_filter_prefers_rust_log() {
        let config = LogConfig {
            level: Some("warn".to_string()),
            ..Default::default()
        };
        assert_eq!(
            resolve_filter(&config, Some("trace".to_string())),
            "trace"
        );
        assert_eq!(resolve_filter(&config, Some("  ".to_string())), "warn");
        assert_eq!(resolve_filter(&config, None), "warn");
    }

    #[test]
    fn test_set_log_level_before_init_fails() {
        // the subscriber is never installed in unit tests
        assert!(set_log_level("debug").is_err());
        assert_eq!(get_log_level(), "unknown");
    }

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::WARN), "[WARN]");
        assert_eq!(format_level(&Level::TRACE), "[TRACE]");
    }
}
