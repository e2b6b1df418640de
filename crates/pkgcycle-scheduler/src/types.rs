#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Updating,
    SelectingBatch,
    Installing,
    Waiting,
    Uninstalling,
    PeriodicCleanup,
    Completed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Selected,
    Installed,
    Waiting,
    Uninstalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub sequence_number: u64,
    /// Counted against the quota even when the catalog could supply fewer items.
    pub size: u64,
    pub items: Vec<String>,
    pub phase: BatchPhase,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleProgress {
    pub total_quota: u64,
    pub processed_count: u64,
    pub batch_number: u64,
}

impl ScheduleProgress {
    pub fn remaining(&self) -> u64 {
        self.total_quota.saturating_sub(self.processed_count)
    }

    pub fn is_complete(&self) -> bool {
        self.processed_count >= self.total_quota
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseMode {
    WholeBatch,
    PerItemFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub mode: PhaseMode,
}

impl PhaseReport {
    pub fn describe(&self) -> String {
        format!("{}/{} successful", self.succeeded, self.attempted)
    }

    pub fn made_progress(&self) -> bool {
        self.succeeded > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub sequence_number: u64,
    pub size: u64,
    pub items: Vec<String>,
    pub install: PhaseReport,
    /// `None` when a stop request arrived before removal started.
    pub uninstall: Option<PhaseReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub progress: ScheduleProgress,
    pub update_succeeded: bool,
    pub batches: Vec<BatchReport>,
}
