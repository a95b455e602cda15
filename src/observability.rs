//! Structured logging configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Plain or JSON output
//! - Log level from `RUST_LOG` or configuration
//! - Spans around database maintenance and migration

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Initialize tracing.
///
/// `RUST_LOG` takes precedence over `config.level` when set.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed in this process.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
}

/// Span helpers.
pub mod spans {
    use tracing::{info_span, Span};

    /// Span for a database operation.
    ///
    /// # Arguments
    ///
    /// * `operation` - What is being done (migrate, vacuum, raze, ...)
    /// * `table` - Table the operation is scoped to, or `*` for the whole file
    #[must_use]
    pub fn db_span(operation: &str, table: &str) -> Span {
        info_span!(
            "db_operation",
            operation = %operation,
            table = %table,
        )
    }

    /// Span for one job on the history thread.
    #[must_use]
    pub fn job_span(kind: &'static str) -> Span {
        info_span!("history_job", kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_db_span() {
        let span = spans::db_span("vacuum", "*");
        let _guard = span.enter();
    }

    #[test]
    fn test_job_span() {
        let span = spans::job_span("call");
        let _guard = span.enter();
    }
}
