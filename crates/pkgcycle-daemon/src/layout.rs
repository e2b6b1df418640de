use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_RUNTIME_DIR: &str = "/tmp";
pub const LOCK_FILE_NAME: &str = "pkgcycle.pid";
pub const LOG_FILE_NAME: &str = "pkgcycle.log";

/// Well-known locations shared by `start`, `stop` and `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    root: PathBuf,
}

impl RuntimeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    pub fn ensure_root_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self::new(DEFAULT_RUNTIME_DIR)
    }
}
