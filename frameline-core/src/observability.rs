//! Structured logging setup and span helpers
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the embedding application through [`init_tracing`] or
//! [`init_tracing_with`].

use std::time::Instant;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AppError, AppResult};

const DEFAULT_FILTER: &str = "frameline_core=info";

/// Initialize tracing with environment-based configuration
///
/// `RUST_LOG` wins when set; otherwise `frameline_core=info`.
pub fn init_tracing() -> AppResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| {
            AppError::config(format!("Failed to install tracing subscriber: {}", e)).with_source(e)
        })
}

/// Initialize tracing from [`LoggingConfig`]; `RUST_LOG` still takes precedence
pub fn init_tracing_with(config: &LoggingConfig) -> AppResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            AppError::config(format!("Invalid log level '{}': {}", config.level, e))
        })?,
    };

    let registry = Registry::default().with(env_filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
    };

    installed.map_err(|e| {
        AppError::config(format!("Failed to install tracing subscriber: {}", e)).with_source(e)
    })
}

/// Create a span for a list repository operation
#[inline]
pub fn list_span(operation: &str, scope: &str) -> Span {
    tracing::debug_span!(
        "list",
        operation = %operation,
        scope = %scope,
        items = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span for a document store call
#[inline]
pub fn store_span(operation: &str, path: &str) -> Span {
    tracing::debug_span!(
        "store",
        operation = %operation,
        path = %path,
        duration_ms = tracing::field::Empty,
    )
}

/// Create a span for project orchestration
#[inline]
pub fn project_span(operation: &str, project_id: &str) -> Span {
    tracing::info_span!(
        "project",
        operation = %operation,
        project_id = %project_id,
        duration_ms = tracing::field::Empty,
        status = tracing::field::Empty,
    )
}

/// Record the duration of an operation in the current span
pub fn record_duration(start: Instant) {
    let duration = start.elapsed();
    Span::current().record("duration_ms", duration.as_millis() as u64);
}
