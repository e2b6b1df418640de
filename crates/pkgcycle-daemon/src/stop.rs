use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::lock::{LockInspection, ProcessGuard};
use crate::process::{ProcessSignaller, SystemSignaller};

pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);
const LIVENESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    NothingRunning,
    CorruptLockRemoved { reason: String },
    AlreadyExited { pid: u32 },
    Terminated { pid: u32 },
    Killed { pid: u32 },
}

/// Client side of `stop`: SIGTERM, grace period, then SIGKILL.
pub struct StopController<S = SystemSignaller> {
    guard: ProcessGuard,
    signaller: S,
    grace: Duration,
}

impl StopController<SystemSignaller> {
    pub fn new(guard: ProcessGuard) -> Self {
        Self::with_signaller(guard, SystemSignaller)
    }
}

impl<S: ProcessSignaller> StopController<S> {
    pub fn with_signaller(guard: ProcessGuard, signaller: S) -> Self {
        Self {
            guard,
            signaller,
            grace: DEFAULT_STOP_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn signaller(&self) -> &S {
        &self.signaller
    }

    /// Stops the recorded instance and always clears the lock afterward,
    /// since a killed daemon never runs its own cleanup.
    pub fn stop(&self) -> Result<StopOutcome> {
        let pid = match self.guard.inspect()? {
            LockInspection::Missing => return Ok(StopOutcome::NothingRunning),
            LockInspection::Corrupt { reason } => {
                self.guard.remove_lock()?;
                return Ok(StopOutcome::CorruptLockRemoved { reason });
            }
            LockInspection::Stale(record) => {
                self.guard.remove_lock()?;
                return Ok(StopOutcome::AlreadyExited {
                    pid: record.process_id,
                });
            }
            LockInspection::Live(record) => record.process_id,
        };

        let outcome = self.terminate_with_escalation(pid);
        self.guard.remove_lock()?;
        outcome
    }

    fn terminate_with_escalation(&self, pid: u32) -> Result<StopOutcome> {
        self.signaller.terminate(pid)?;
        if self.wait_for_exit(pid) {
            return Ok(StopOutcome::Terminated { pid });
        }

        self.signaller.kill(pid)?;
        Ok(StopOutcome::Killed { pid })
    }

    fn wait_for_exit(&self, pid: u32) -> bool {
        let started = Instant::now();
        loop {
            if !self.signaller.is_alive(pid) {
                return true;
            }
            let waited = started.elapsed();
            if waited >= self.grace {
                return false;
            }
            thread::sleep(LIVENESS_POLL_INTERVAL.min(self.grace - waited));
        }
    }
}
