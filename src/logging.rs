//! Tracing subscriber setup.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LoggingConfig;
use crate::error::{BotError, Result};

/// File name prefix for the daily rolling log.
pub const LOG_FILE_PREFIX: &str = "postbot.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Default filter directive: our target at the configured level, everything
/// else at `warn`.
pub fn filter_directive(config: &LoggingConfig) -> String {
    format!("postbot={},warn", config.effective_level())
}

fn output_layer<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Output always goes
/// to stdout; when a log directory is configured it is also written to a
/// daily rolling file, and the returned guard must be held until shutdown
/// so buffered lines are flushed.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let mut layers = vec![output_layer(std::io::stdout, config.json, true)];
    let mut guard = None;
    if let Some(dir) = &config.directory {
        std::fs::create_dir_all(dir)?;
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(output_layer(non_blocking, config.json, false));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| BotError::Config(format!("cannot install logger: {e}")))?;

    Ok(guard)
}
