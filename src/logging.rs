//! Logging setup
//!
//! Logs go to stderr, compact or JSON, filtered by `RUST_LOG` when set and by the
//! configured level otherwise. An optional log file is rotated daily and written
//! through a non-blocking appender; keep the returned guard alive until shutdown
//! or buffered lines are lost.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{HomeyError, Result};
use std::ffi::OsStr;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(config: &LoggingConfig, debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else if config.level.trim().is_empty() {
        "info".to_string()
    } else {
        config.level.trim().to_lowercase()
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<Option<WorkerGuard>> {
    let directive = default_directive(config, debug);
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if !debug => filter,
        _ => EnvFilter::try_new(&directive).map_err(|e| {
            HomeyError::config(format!("Invalid log level '{directive}': {e}"))
        })?,
    };

    let (compact_layer, json_layer) = match config.format {
        LogFormat::Compact => (
            Some(fmt::layer().compact().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;

            let file_name = path
                .file_name()
                .unwrap_or_else(|| OsStr::new("homey-mcp.log"));
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(compact_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| HomeyError::config(format!("Failed to initialize logging: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        let mut config = LoggingConfig::default();
        assert_eq!(default_directive(&config, false), "info");
        assert_eq!(default_directive(&config, true), "debug");

        config.level = "WARN".to_string();
        assert_eq!(default_directive(&config, false), "warn");
    }
}
