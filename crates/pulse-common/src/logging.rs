//! ---
//! pulse_section: "01-core-functionality"
//! pulse_subsection: "module"
//! pulse_type: "source"
//! pulse_scope: "code"
//! pulse_description: "Process-wide tracing initialisation for the logging pipeline."
//! pulse_version: "v0.0.0-prealpha"
//! pulse_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use pulse_logging::{PipelineLayer, RecordFormat, RotatingFile, Sink};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "PULSE_LOG";

/// Keeps the background log writers alive. Dropping it flushes pending records.
#[must_use = "dropping the guard stops the log writers"]
#[derive(Debug, Default)]
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

impl LoggingGuard {
    fn push(&mut self, guard: WorkerGuard) {
        self._guards.push(guard);
    }
}

fn lossless<W>(writer: W) -> (NonBlocking, WorkerGuard)
where
    W: std::io::Write + Send + 'static,
{
    NonBlockingBuilder::default().lossy(false).finish(writer)
}

/// Build the sinks described by `config` without installing them.
///
/// Produces the human and JSON rotating files and, when enabled, a human
/// console sink. All of them share the configured minimum severity.
pub fn build_pipeline(config: &LoggingConfig) -> Result<(PipelineLayer, LoggingGuard)> {
    let level = config.level_filter()?;
    let mut guard = LoggingGuard::default();

    let human_file = RotatingFile::open(config.human_path(), config.rotation())
        .with_context(|| format!("unable to open log file {}", config.human_path().display()))?;
    let json_file = RotatingFile::open(config.json_path(), config.rotation())
        .with_context(|| format!("unable to open log file {}", config.json_path().display()))?;

    let (human_writer, human_guard) = lossless(human_file);
    let (json_writer, json_guard) = lossless(json_file);
    guard.push(human_guard);
    guard.push(json_guard);

    let mut layer = PipelineLayer::new()
        .with_sink(Sink::new("human-file", RecordFormat::Human, level, human_writer))
        .with_sink(Sink::new("json-file", RecordFormat::Json, level, json_writer));

    if config.console {
        let (stdout_writer, stdout_guard) = lossless(std::io::stdout());
        guard.push(stdout_guard);
        layer = layer.with_sink(Sink::new("console", RecordFormat::Human, level, stdout_writer));
    }

    Ok((layer, guard))
}

/// Install the logging pipeline as the global subscriber.
///
/// * `PULSE_LOG` overrides the filter (e.g. `info`, `debug,hyper=warn`). When
///   unset the standard `RUST_LOG` variable is honoured, finally defaulting to
///   the configured level.
/// * Records go to the rotating human and JSON files and, unless disabled,
///   to stdout in human form.
///
/// The returned guard must be held until the process exits.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = config.level_filter()?;
    let (layer, guard) = build_pipeline(config)?;

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        level = %level,
        "tracing initialised"
    );
    Ok(guard)
}

fn env_filter(level: LevelFilter) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(level.into());
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to {} logging",
                LOG_ENV, err, level
            );
            fallback()
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
    }
}
