//! Tracing setup for the CLI.
//!
//! Events go to a compact stdout layer and to an append-only log file. The file path comes from
//! [`Config::log_file`] and defaults to `logs/prml-qa.log`; the file layer writes through a
//! non-blocking worker whose guard lives for the rest of the process.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "prml-qa.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stdout, and the log file.
///
/// If the log file cannot be opened, a warning goes to stderr and only stdout is used.
pub fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let path = log_file_path(config);
    match open_log_file(&path) {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(file_writer(file))
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
            tracing::debug!(path = %path.display(), "File logging enabled");
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            registry.init();
        }
    }
}

/// Log file the CLI writes to for this configuration.
pub fn log_file_path(config: &Config) -> PathBuf {
    config
        .log_file
        .clone()
        .unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE))
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_writer(file: File) -> NonBlocking {
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    non_blocking
}
