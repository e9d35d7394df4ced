//! Observability infrastructure for Canopy.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors used across the
//! ingestion pipeline.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `canopy_ingest=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for pipeline operations with standard fields.
#[must_use]
pub fn pipeline_span(operation: &str, api_id: &str) -> Span {
    tracing::info_span!("pipeline", op = operation, api_id = api_id)
}

/// Creates a span for one refresh scheduler pass.
#[must_use]
pub fn sweep_span(pass: u64) -> Span {
    tracing::info_span!("sweep", pass = pass)
}
