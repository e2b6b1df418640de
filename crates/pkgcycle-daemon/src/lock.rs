use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use crate::fs_utils::remove_file_if_exists;
use crate::process::process_exists;
use crate::RuntimeLayout;

const LOCK_FILE_MODE: u32 = 0o644;

/// The pid recorded in the lock file plus when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub process_id: u32,
    pub acquired_at_unix: Option<u64>,
}

/// What is on disk, without acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockInspection {
    Missing,
    Live(LockRecord),
    Stale(LockRecord),
    Corrupt { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardStatus {
    NotRunning,
    RunningWithPid(u32),
    StaleLockRemoved { previous_pid: Option<u32> },
}

/// Single-instance guard backed by an advisory pid file.
///
/// The guard is cooperative: `start`, `stop` and `status` all go through it,
/// but nothing stops an outside process from editing the file.
#[derive(Debug, Clone)]
pub struct ProcessGuard {
    layout: RuntimeLayout,
}

impl ProcessGuard {
    pub fn new(layout: RuntimeLayout) -> Self {
        Self { layout }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.layout.lock_path()
    }

    pub fn read_lock(&self) -> Result<Option<LockRecord>> {
        match self.inspect()? {
            LockInspection::Missing | LockInspection::Corrupt { .. } => Ok(None),
            LockInspection::Live(record) | LockInspection::Stale(record) => Ok(Some(record)),
        }
    }

    pub fn inspect(&self) -> Result<LockInspection> {
        let path = self.lock_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LockInspection::Missing);
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                return Ok(LockInspection::Corrupt {
                    reason: "lock file is not valid UTF-8".to_string(),
                });
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read lock file: {}", path.display()));
            }
        };

        let Some(process_id) = parse_lock_pid(&raw) else {
            return Ok(LockInspection::Corrupt {
                reason: format!("lock file does not contain a process id: {:?}", raw.trim()),
            });
        };

        let record = LockRecord {
            process_id,
            acquired_at_unix: lock_modified_unix(&path),
        };
        if process_exists(process_id) {
            Ok(LockInspection::Live(record))
        } else {
            Ok(LockInspection::Stale(record))
        }
    }

    /// Reports a live owner untouched; heals stale or corrupt locks.
    pub fn check_existing(&self) -> Result<GuardStatus> {
        let previous_pid = match self.inspect()? {
            LockInspection::Missing => return Ok(GuardStatus::NotRunning),
            LockInspection::Live(record) => {
                return Ok(GuardStatus::RunningWithPid(record.process_id));
            }
            LockInspection::Stale(record) => {
                debug!(pid = record.process_id, "removing stale lock file");
                Some(record.process_id)
            }
            LockInspection::Corrupt { reason } => {
                warn!(%reason, "removing corrupt lock file");
                None
            }
        };

        self.remove_lock()?;
        Ok(GuardStatus::StaleLockRemoved { previous_pid })
    }

    /// Claims the lock for `pid` with an exclusive create.
    pub fn acquire(&self, pid: u32) -> Result<LockGuard> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(LOCK_FILE_MODE)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                let detail = self
                    .read_lock()
                    .ok()
                    .flatten()
                    .map(|record| format!(" (pid={})", record.process_id))
                    .unwrap_or_default();
                return Err(anyhow!(
                    "lock file already exists{detail}: {}",
                    path.display()
                ));
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create lock file: {}", path.display()));
            }
        };

        file.write_all(format!("{pid}\n").as_bytes())
            .with_context(|| format!("failed to write lock file: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush lock file: {}", path.display()))?;

        Ok(LockGuard {
            guard: self.clone(),
            pid,
            released: false,
        })
    }

    /// Deletes the lock only while it still names `pid`. Safe to repeat.
    pub fn release(&self, pid: u32) -> Result<bool> {
        let path = self.lock_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read lock file: {}", path.display()));
            }
        };
        if parse_lock_pid(&raw) != Some(pid) {
            return Ok(false);
        }
        self.remove_lock()
    }

    pub fn remove_lock(&self) -> Result<bool> {
        let path = self.lock_path();
        remove_file_if_exists(&path)
            .with_context(|| format!("failed to remove lock file: {}", path.display()))
    }
}

/// Owned claim on the lock file; dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    guard: ProcessGuard,
    pid: u32,
    released: bool,
}

impl LockGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.guard.release(self.pid)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.guard.release(self.pid) {
            warn!("failed to release lock on exit: {err:#}");
        }
    }
}

pub fn parse_lock_pid(raw: &str) -> Option<u32> {
    let pid = raw.trim().parse::<u32>().ok()?;
    if pid <= 1 || i32::try_from(pid).is_err() {
        return None;
    }
    Some(pid)
}

fn lock_modified_unix(path: &Path) -> Option<u64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs())
}
