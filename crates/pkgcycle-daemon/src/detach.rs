use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context, Result};
use daemonize::Daemonize;

use crate::logging::open_log_file;
use crate::RuntimeLayout;

static DETACHED: AtomicBool = AtomicBool::new(false);

/// Identity of the process left running after detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonHandle {
    pub pid: u32,
}

/// Moves the current program into the background.
///
/// The launcher exits inside this call. The survivor is the grandchild of a
/// fork/setsid/fork sequence: it has no controlling terminal, is not a session
/// leader, runs from `/` with a zero umask, reads stdin from `/dev/null` and
/// writes stdout to `/dev/null`. Stderr goes to the log file so panics land
/// next to the structured log.
///
/// Must run before any thread is spawned; only the calling thread survives.
pub fn detach(layout: &RuntimeLayout) -> Result<DaemonHandle> {
    if DETACHED.swap(true, Ordering::SeqCst) {
        return Err(anyhow!("process is already detached"));
    }

    layout.ensure_root_dir()?;
    let stderr = open_log_file(&layout.log_path())?;

    Daemonize::new()
        .working_directory("/")
        .umask(0o000_u32)
        .stderr(stderr)
        .start()
        .context("failed to detach from the controlling terminal")?;

    Ok(DaemonHandle {
        pid: std::process::id(),
    })
}
