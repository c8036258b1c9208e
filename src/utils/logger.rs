//! Logger initialisation
//!
//! Sets up the global `tracing` subscriber with either console or
//! daily-rolling file output. File logs carry no ANSI escapes.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Initialize the logger with file or console output
///
/// # Arguments
///
/// * `log_dir` - The directory where log files will be stored
/// * `service_name` - Used as part of the log file name and the default filter
/// * `level` - The log level (trace, debug, info, warn, error)
/// * `console` - Whether to log to console instead of file
pub fn init_logger(
    log_dir: impl AsRef<Path>,
    service_name: &str,
    level: &str,
    console: bool,
) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{service_name}={level}")));

    if console {
        fmt().with_env_filter(env_filter).init();
        tracing::info!("Logger initialized for service: {} (console mode)", service_name);
    } else {
        std::fs::create_dir_all(&log_dir)?;
        let file_appender = RollingFileAppender::new(
            Rotation::DAILY,
            log_dir,
            format!("{service_name}.log"),
        );

        fmt()
            .with_env_filter(env_filter)
            .with_writer(file_appender)
            .with_ansi(false)
            .init();
        tracing::info!("Logger initialized for service: {} (file mode)", service_name);
    }

    Ok(())
}

/// Log levels accepted by the configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert string to LogLevel
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(crate::error::NodeBusError::Config(format!(
                "Unknown log level: {s}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
