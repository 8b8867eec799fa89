use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Log to a daily rolling file under `log_dir`, and to stderr for warnings (everything with
/// `verbose`). `RUST_LOG` overrides the default filter.
///
/// The returned guard flushes the file writer on drop and must outlive the program's work.
pub fn enable_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(5)
        .filename_prefix("drip")
        .filename_suffix("log")
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let stderr_level = if verbose { Level::DEBUG } else { Level::WARN };
    let stderr = std::io::stderr.with_max_level(stderr_level);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={default_level},drip_core={default_level}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(stderr.and(file_writer))
        .try_init()
        .map_err(|e| anyhow!(e))?;

    Ok(guard)
}
