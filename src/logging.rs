//! Logging configuration and utilities for the solar feasibility analyzer
//!
//! Provides structured logging for:
//! - Analysis requests
//! - Report tier degradation
//! - Location fallback
//! - Performance metrics

use crate::config::{LogFormat, LoggingConfig};
use crate::models::ReportTier;
use std::io;
use tracing::Span;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> eyre::Result<()> {
    let default_directive = format!("{},solar_feasibility={}", config.level, config.level);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if config.with_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Text => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events)
                .with_writer(io::stderr);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(span_events)
                .json()
                .with_writer(io::stderr);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::info!(
        format = ?config.format,
        build_profile = env!("BUILD_PROFILE"),
        "Solar feasibility analyzer logging initialized"
    );
    Ok(())
}

/// Create a tracing span for one analysis request
pub fn analysis_span(request_id: &str, location: &str) -> Span {
    tracing::info_span!(
        "analysis",
        request_id = %request_id,
        location = %location,
        resolved_location = tracing::field::Empty,
        report_tier = tracing::field::Empty,
        total_time_ms = tracing::field::Empty,
    )
}

/// Create a tracing span for report generation
pub fn report_span(retrieval: &str, snippet_count: usize) -> Span {
    tracing::info_span!(
        "feasibility_report",
        retrieval = retrieval,
        snippet_count = snippet_count,
        tier = tracing::field::Empty,
    )
}

/// Create a tracing span for service lifecycle events
pub fn lifecycle_span(event: &str) -> Span {
    tracing::info_span!(
        "service_lifecycle",
        event = event,
        timestamp = %chrono::Utc::now(),
        build_info = env!("BUILD_TIMESTAMP"),
    )
}

/// Structured logging for performance metrics
pub struct PerformanceLogger {
    start_time: std::time::Instant,
    operation: String,
}

impl PerformanceLogger {
    pub fn start(operation: &str) -> Self {
        tracing::debug!("Starting performance measurement for: {}", operation);
        Self {
            start_time: std::time::Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn log_milestone(&self, milestone: &str) {
        let elapsed = self.start_time.elapsed();
        tracing::debug!(
            operation = %self.operation,
            milestone = milestone,
            elapsed_ms = elapsed.as_millis(),
            "Performance milestone reached"
        );
    }

    /// Finish the measurement, returning the elapsed milliseconds
    pub fn finish(self) -> u128 {
        let total_time = self.start_time.elapsed().as_millis();
        tracing::info!(
            operation = %self.operation,
            total_time_ms = total_time,
            "Performance measurement completed"
        );
        total_time
    }
}

/// Log a report tier transition
pub fn log_tier_degradation(from_tier: ReportTier, to_tier: ReportTier, reason: &str) {
    tracing::info!(
        from_tier = from_tier.as_str(),
        to_tier = to_tier.as_str(),
        reason = reason,
        "Report tier degraded"
    );
}

/// Log that a request was answered with data from another location
pub fn log_location_fallback(requested: &str, resolved: &str, reason: &str) {
    tracing::warn!(
        requested = requested,
        resolved = resolved,
        reason = reason,
        "Weather data unavailable for location, using fallback"
    );
}

/// Log retrieval backend selection
pub fn log_retrieval(backend: &str, query_len: usize, results: usize, latency_ms: u64) {
    tracing::debug!(
        backend = backend,
        query_len = query_len,
        results = results,
        latency_ms = latency_ms,
        "Policy retrieval completed"
    );
}

/// Custom macro for analyzer error logging
#[macro_export]
macro_rules! analyzer_error {
    ($($arg:tt)*) => {
        tracing::error!(
            target: "solar_feasibility",
            component = "analyzer",
            $($arg)*
        )
    };
}

/// Custom macro for RAG pipeline debug logging
#[macro_export]
macro_rules! rag_debug {
    ($($arg:tt)*) => {
        tracing::debug!(
            target: "solar_feasibility",
            component = "rag",
            $($arg)*
        )
    };
}
