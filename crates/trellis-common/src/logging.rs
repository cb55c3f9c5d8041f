//! Logging configuration and setup.
//!
//! The engine itself only emits `tracing` events; a host application (or a
//! test) installs a subscriber through [`init_logging`].

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events are enabled by the default filter.
const ENGINE_TARGETS: &[&str] = &[
    "trellis_common",
    "trellis_net",
    "trellis_cssparser",
    "trellis_css",
    "trellis_dom",
    "trellis_media",
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format for structured logging.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level applied to the engine crates.
    pub level: Level,
    pub format: LogFormat,
    /// Route output through the test harness capture.
    pub test_writer: bool,
    /// Custom filter string (e.g., "trellis_dom=debug,trellis_net=warn").
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            test_writer: false,
            filter: None,
        }
    }
}

impl LogConfig {
    /// Configuration for unit and integration tests.
    pub fn for_tests() -> Self {
        Self {
            level: Level::TRACE,
            test_writer: true,
            ..Default::default()
        }
    }

    /// Structured output for services embedding the engine.
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Set a custom filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directives derived from this configuration.
    pub fn directives(&self) -> String {
        match &self.filter {
            Some(custom) => custom.clone(),
            None => ENGINE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, self.level))
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if self.filter.is_none() {
            if let Ok(from_env) = EnvFilter::try_from_default_env() {
                return from_env;
            }
        }
        EnvFilter::try_new(self.directives())
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Install a global subscriber for the given configuration.
///
/// Returns `false` when a subscriber was already installed, which makes the
/// call safe to repeat from every test.
pub fn init_logging(config: LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let result = match (config.format, config.test_writer) {
        (LogFormat::Json, true) => registry.with(fmt::layer().json().with_test_writer()).try_init(),
        (LogFormat::Json, false) => registry.with(fmt::layer().json()).try_init(),
        (LogFormat::Pretty, true) => registry
            .with(fmt::layer().with_target(true).with_test_writer())
            .try_init(),
        (LogFormat::Pretty, false) => registry.with(fmt::layer().with_target(true)).try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_engine_crates() {
        let directives = LogConfig::default().directives();
        assert!(directives.contains("trellis_dom=INFO"));
        assert!(directives.contains("trellis_media=INFO"));
    }

    #[test]
    fn test_custom_filter_wins() {
        let config = LogConfig::default().with_filter("trellis_css=trace").json();
        assert_eq!(config.directives(), "trellis_css=trace");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_init_is_repeatable() {
        init_logging(LogConfig::for_tests());
        assert!(!init_logging(LogConfig::for_tests()));
    }
}
