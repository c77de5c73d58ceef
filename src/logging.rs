use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const FILTER_ENV: &str = "MINIMAX_VOICE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

/// Routes `tracing` output to the append-only log file. The terminal belongs
/// to the UI, so nothing is written to stdout or stderr.
pub fn init(log_file: &Path) -> Result<(), LoggingError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|source| LoggingError::Open {
            path: log_file.to_path_buf(),
            source,
        })?;
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}
