mod apt;
mod executor;
mod pacing;
mod scheduler;
mod types;

pub use apt::{run_with_timeout, AptExecutor};
pub use executor::{
    truncate_diagnostic, OperationOutcome, OperationStatus, PackageOperationExecutor,
    DIAGNOSTIC_LIMIT,
};
pub use pacing::{Pacer, PauseOutcome, TickPacer};
pub use scheduler::{clamp_batch_size, BatchScheduler};
pub use types::{
    Batch, BatchPhase, BatchReport, PhaseMode, PhaseReport, RunOutcome, RunSummary,
    ScheduleProgress, SchedulerPhase,
};

#[cfg(test)]
mod tests;
