use std::time::{Duration, Instant};

use pkgcycle_core::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Elapsed,
    Cancelled,
}

/// Sleeps between scheduler phases.
pub trait Pacer {
    fn pause(&mut self, duration: Duration, token: &CancellationToken) -> PauseOutcome;
}

/// Sleeps in fixed ticks, re-checking the token after every tick so a stop
/// request is observed within one tick no matter how long the pause is.
#[derive(Debug, Clone, Copy)]
pub struct TickPacer {
    tick: Duration,
}

impl TickPacer {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }
}

impl Pacer for TickPacer {
    fn pause(&mut self, duration: Duration, token: &CancellationToken) -> PauseOutcome {
        let deadline = deadline_after(duration);
        loop {
            if token.is_cancelled() {
                return PauseOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                return PauseOutcome::Elapsed;
            }
            if token.wait_timeout(self.tick.min(deadline - now)) {
                return PauseOutcome::Cancelled;
            }
        }
    }
}

/// `now + duration`, clamped to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

// about thirty years; later deadlines are indistinguishable from never
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);
