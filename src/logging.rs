use crate::error::{AppResult, InstallSubscriberSnafu, SetupLoggingSnafu};
use snafu::ResultExt;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Flushes the log files when dropped, so keep it alive for the life of the process.
#[must_use]
pub struct LogGuards {
    _combined: WorkerGuard,
    _errors: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_appender(dir: &Path, name: &str) -> AppResult<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .filename_suffix("log")
        .build(dir)
        .context(SetupLoggingSnafu {
            dir: dir.display().to_string(),
        })
}

/// Human-readable output on stdout, plus JSON lines in `combined.log` (everything that passes
/// `RUST_LOG`) and `error.log` (errors only) under `log_dir`.
pub fn init(log_dir: &Path) -> AppResult<LogGuards> {
    let (combined, combined_guard) =
        tracing_appender::non_blocking(file_appender(log_dir, "combined")?);
    let (errors, errors_guard) = tracing_appender::non_blocking(file_appender(log_dir, "error")?);

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(env_filter()))
        .with(
            fmt::layer()
                .json()
                .with_writer(combined)
                .with_filter(env_filter()),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(errors)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context(InstallSubscriberSnafu)?;

    Ok(LogGuards {
        _combined: combined_guard,
        _errors: errors_guard,
    })
}
