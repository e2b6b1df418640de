//! File-backed tracing setup for the background process.
//!
//! Filter priority: `PKGCYCLE_LOG`, then `RUST_LOG`, then `info`.

use std::fs::{self, File};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PKGCYCLE_LOG";
const LOG_FILE_MODE: u32 = 0o644;
const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global subscriber writing timestamped lines to the log file.
pub fn init_file_logging(log_path: &Path) -> Result<()> {
    let file = open_log_file(log_path)?;
    tracing_subscriber::fmt()
        .with_env_filter(build_env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))
}

pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log dir: {}", parent.display()))?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(LOG_FILE_MODE)
        .open(path)
        .with_context(|| format!("failed to open log file: {}", path.display()))
}

/// Last `count` lines of the log, or `None` when no log exists yet.
pub fn read_log_tail(path: &Path, count: usize) -> Result<Option<Vec<String>>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read log file: {}", path.display()));
        }
    };

    let text = String::from_utf8_lossy(&raw);
    let lines = text.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(count);
    Ok(Some(
        lines[start..]
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect(),
    ))
}

fn build_env_filter() -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV_VAR) {
        if let Ok(filter) = EnvFilter::try_new(&directives) {
            return filter;
        }
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(DEFAULT_DIRECTIVE)
}
