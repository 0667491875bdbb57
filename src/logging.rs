//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, optionally, to a
//! JSON-lines file for following a batch through the pipeline.

use std::fs;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging. Only the first call has any effect, and an
/// already-installed global subscriber is left in place.
pub fn init_structured_logging(config: &LoggingConfig, environment: &str) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let log_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(environment).to_string());
        let pid = process::id();

        // stdout is reserved for program output such as notification envelopes
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(EnvFilter::new(&log_level));

        let mut guard = None;
        let mut log_file = None;
        let file_layer = if config.json_file {
            match fs::create_dir_all(&config.directory) {
                Ok(()) => {
                    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
                    let file_name = format!("{environment}.{pid}.{timestamp}.log");
                    let appender = tracing_appender::rolling::never(&config.directory, &file_name);
                    let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                    guard = Some(worker_guard);
                    log_file = Some(config.directory.join(file_name));
                    Some(
                        fmt::layer()
                            .with_writer(writer)
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_level(true)
                            .with_ansi(false)
                            .json()
                            .with_filter(EnvFilter::new(&log_level)),
                    )
                }
                Err(e) => {
                    eprintln!(
                        "Failed to create log directory {}: {e}; logging to console only",
                        config.directory.display()
                    );
                    None
                }
            }
        } else {
            None
        };

        // A global subscriber may already be set by the embedding process
        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid,
            environment = %environment,
            level = %log_level,
            log_file = ?log_file,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
        guard
    });
}

/// Log level for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for batch lifecycle operations
pub fn log_batch_operation(
    operation: &str,
    batch_id: u64,
    control_year: i32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        batch_id,
        control_year,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 BATCH_OPERATION"
    );
}

/// Log structured data for stage dispatch in the processing loop
pub fn log_stage_operation(stage: &str, batch_id: u64, channel: &str, status: &str) {
    tracing::debug!(
        stage = %stage,
        batch_id,
        channel = %channel,
        status = %status,
        "🔧 STAGE_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init_structured_logging(&config, "test");
        init_structured_logging(&config, "test");
        log_batch_operation("rotate", 1, 2024, "ok", None);
    }
}
