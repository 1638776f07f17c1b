use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use warden_config::domains::logging::LogFormat;
use warden_config::LoggingConfig;

/// Directory under the state directory that holds worker log files
pub const LOG_DIR_NAME: &str = "logs";

/// Keeps the background file writer alive; drop it last.
#[must_use = "dropping the guard stops the file writer"]
#[derive(Default)]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Log file of a detached worker: `<state_dir>/logs/<service_id>.log`
pub fn worker_log_file(state_dir: &Path, service_id: &str) -> PathBuf {
    state_dir.join(LOG_DIR_NAME).join(format!("{}.log", service_id))
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<LoggingGuard> {
    let env_filter = build_filter(&config.level.to_string());

    let Some(ref file) = config.file else {
        install(env_filter, config.format, std::io::stderr, true);
        return Ok(LoggingGuard::default());
    };

    let directory = file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Log file path {:?} does not name a file", file))?;

    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {:?}", directory))?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .with_context(|| format!("Failed to open log file {:?}", file))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    install(env_filter, config.format, writer, false);

    Ok(LoggingGuard {
        _file_writer: Some(guard),
    })
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    install(build_filter(log_level), LogFormat::Text, std::io::stderr, true);
    Ok(())
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn install<W>(env_filter: EnvFilter, format: LogFormat, writer: W, ansi: bool)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi);

    // try_init: a global subscriber may already be set
    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }
}
