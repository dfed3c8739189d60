//! Structured logging for the relframe CLI
//!
//! Logs never go to stdout, which carries the compiled request. Console
//! output is written to stderr; file output rotates daily.

use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Log format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line events
    Pretty,
    /// JSON format (structured logging)
    Json,
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    File,
    /// Log to both stderr and file
    Both,
}

impl LogOutput {
    pub fn parse(value: &str) -> Self {
        match value {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stderr,
        }
    }
}

const LOG_FILE: &str = "relframe.log";

/// Initialize the logging system from `config`
///
/// Examples:
/// ```bash
/// # Trace every emitted relational node
/// RUST_LOG=relframe_calcite=debug relframe plan.json
///
/// # JSON events to a daily rolling file
/// LOG_FORMAT=json LOG_OUTPUT=file LOG_DIR=/var/log/relframe relframe plan.json
/// ```
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);

    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("warn"))?;

    match output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer(format))
                .try_init()?;
        }
        LogOutput::File | LogOutput::Both => {
            std::fs::create_dir_all(&config.directory)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, LOG_FILE);
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with((output == LogOutput::Both).then(|| console_layer(format)))
                .try_init()?;
        }
    }

    tracing::debug!(format = ?format, output = ?output, level = %config.level, "Logging initialized");
    Ok(())
}

fn console_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
    }
}
