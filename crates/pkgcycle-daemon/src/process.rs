use anyhow::{anyhow, Context, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Signal delivery and liveness probing for a recorded process id.
pub trait ProcessSignaller {
    fn is_alive(&self, pid: u32) -> bool;
    fn terminate(&self, pid: u32) -> Result<()>;
    fn kill(&self, pid: u32) -> Result<()>;
}

/// Delivers real signals through `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSignaller;

impl ProcessSignaller for SystemSignaller {
    fn is_alive(&self, pid: u32) -> bool {
        process_exists(pid)
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        send_signal(pid, Signal::SIGTERM)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        send_signal(pid, Signal::SIGKILL)
    }
}

/// Null-signal check. A process we may not signal still exists.
pub fn process_exists(pid: u32) -> bool {
    let Ok(pid) = to_pid(pid) else {
        return false;
    };
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let target = to_pid(pid)?;
    match kill(target, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to send {signal} to process {pid}")),
    }
}

// pid 0 and -1 address process groups, never a single recorded process
fn to_pid(pid: u32) -> Result<Pid> {
    let raw = i32::try_from(pid).map_err(|_| anyhow!("process id out of range: {pid}"))?;
    if raw <= 1 {
        return Err(anyhow!("refusing to signal process id {pid}"));
    }
    Ok(Pid::from_raw(raw))
}
