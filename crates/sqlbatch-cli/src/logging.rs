//! Logging setup for the sqlbatch binary
//!
//! Everything is written to stderr so that stdout carries only batch output.
//! `RUST_LOG` takes precedence over the filter derived from `-v`.

use std::io::IsTerminal;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, VariantNames};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log line format
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumString,
    VariantNames,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,

    /// Whether to include file/line information in logs
    pub include_location: bool,

    /// Whether to log span open/close (for timing batches)
    pub enable_spans: bool,

    /// Default log level filter
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::from_verbosity(0, LogFormat::default())
    }
}

impl LoggingConfig {
    /// Map the number of `-v` flags to a filter
    pub fn from_verbosity(verbosity: u8, format: LogFormat) -> Self {
        let default_filter = match verbosity {
            // failures that are returned get printed by main; only log the ones that are not
            0 => "error",
            1 => "warn,sqlbatch_cli=info,sqlbatch_core=info,sqlbatch_query=info,sqlbatch_driver_sqlite=info",
            2 => "info,sqlbatch_cli=debug,sqlbatch_core=debug,sqlbatch_query=debug,sqlbatch_driver_sqlite=debug",
            _ => "trace",
        };

        Self {
            format,
            include_location: verbosity >= 3,
            enable_spans: verbosity >= 2,
            default_filter: default_filter.to_string(),
        }
    }
}

/// Initialize the logging system with the given configuration
pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    // RUST_LOG environment variable takes precedence over default filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let ansi = std::io::stderr().is_terminal();
    let layer = match config.format {
        LogFormat::Compact => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .compact()
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events)
            .with_ansi(ansi)
            .with_writer(std::io::stderr)
            .pretty()
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::debug!(format = %config.format, filter = %config.default_filter, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, "error")]
    #[case(3, "trace")]
    #[case(9, "trace")]
    fn test_verbosity_filter(#[case] verbosity: u8, #[case] expected: &str) {
        let config = LoggingConfig::from_verbosity(verbosity, LogFormat::Json);
        assert_eq!(config.default_filter, expected);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_debug_verbosity_enables_spans() {
        let config = LoggingConfig::from_verbosity(2, LogFormat::Compact);
        assert!(config.enable_spans);
        assert!(!config.include_location);
        assert!(config.default_filter.contains("sqlbatch_query=debug"));
        assert!(!LoggingConfig::default().enable_spans);
    }

    #[test]
    fn test_log_format_tags() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::VARIANTS, &["compact", "pretty", "json"]);
    }
}
