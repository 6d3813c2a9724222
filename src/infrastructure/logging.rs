//! Logging system configuration and initialization
//!
//! - Console output through a `fmt` layer
//! - File output to `<logs>/log_<YYYY-MM-DD>.log` through a non-blocking appender
//! - Optional JSON formatting for the file layer
//! - Local-time timestamps
//!
//! `RUST_LOG` overrides the configured level and module filters.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("No logging output configured")]
    NoOutput,

    #[error("Failed to install the global subscriber: {0}")]
    Install(String),
}

/// Keeps the file writer flushing until dropped at the end of `main`
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug, Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Local time with milliseconds and offset
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// `log_<YYYY-MM-DD>.log` for today
pub fn log_file_name() -> String {
    format!("log_{}.log", Local::now().format("%Y-%m-%d"))
}

/// Build the level filter from the config; `RUST_LOG` wins when set.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level).map_err(|e| LoggingError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })?;

    // Dependency filters only apply below TRACE
    if !config.level.eq_ignore_ascii_case("trace") {
        for (module, level) in &config.module_filters {
            let directive = format!("{module}={level}");
            let parsed = directive.parse().map_err(|e: tracing_subscriber::filter::ParseError| {
                LoggingError::Filter {
                    directive: directive.clone(),
                    reason: e.to_string(),
                }
            })?;
            filter = filter.add_directive(parsed);
        }
    }

    Ok(filter)
}

/// Install the global subscriber. Keep the returned guard alive for the whole run.
pub fn init_logging(config: &LoggingConfig, log_dir: &Path) -> Result<LogGuard, LoggingError> {
    if !config.file_output && !config.console_output {
        return Err(LoggingError::NoOutput);
    }

    let filter = build_filter(config)?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = LogGuard::default();

    if config.file_output {
        std::fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDir {
            path: log_dir.to_path_buf(),
            source,
        })?;

        let file_appender = rolling::never(log_dir, log_file_name());
        let (file_writer, file_guard) = non_blocking(file_appender);
        guard._file = Some(file_guard);

        if config.json_format {
            layers.push(
                fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            );
        } else {
            layers.push(
                fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(LocalTimeFormatter)
                    .with_target(false)
                    .with_ansi(false)
                    .boxed(),
            );
        }
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    info!("Logging system initialized");
    info!("Log directory: {:?}", log_dir);
    info!("Log level: {}", config.level);

    Ok(guard)
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== catalog-scraper {} ===", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_dated() {
        let name = log_file_name();
        assert!(name.starts_with("log_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "log_2024-03-05.log".len());
    }

    #[test]
    fn no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            init_logging(&config, dir.path()),
            Err(LoggingError::NoOutput)
        ));
    }

    #[test]
    fn bad_module_filter_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("reqwest".to_string(), "loud".to_string());
        assert!(matches!(
            build_filter(&config),
            Err(LoggingError::Filter { .. })
        ));
    }
}
