use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogConfig, DEFAULT_LOG_FILTER};

pub const LOG_FILE_PREFIX: &str = "submon.log";

/// Install the global subscriber: stderr (text or JSON) plus an optional
/// daily-rolling JSON file sink.
///
/// Keep the returned guard alive for the life of the process so buffered file
/// lines are flushed. Calling this twice leaves the first subscriber in place.
pub fn init(config: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339());
    if config.json {
        layers.push(stderr.json().boxed());
    } else {
        layers.push(stderr.boxed());
    }

    let mut guard = None;
    if let Some(dir) = &config.file_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .json()
                .boxed(),
        );
        guard = Some(file_guard);
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!(target: "submon", event = "logging_already_initialised");
    }
    Ok(guard)
}
