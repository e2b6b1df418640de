use std::time::Duration;

use pkgcycle_core::{CancellationToken, ItemCatalog, ScheduleConfig};
use rand::Rng;
use tracing::{info, warn};

use crate::executor::PackageOperationExecutor;
use crate::pacing::{Pacer, PauseOutcome};
use crate::types::{
    Batch, BatchPhase, BatchReport, PhaseMode, PhaseReport, RunOutcome, RunSummary,
    ScheduleProgress, SchedulerPhase,
};

const RULE: &str = "==================================================";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageOperation {
    Install,
    Remove,
}

impl PackageOperation {
    fn verb(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "uninstall",
        }
    }
}

/// Drives update, then repeated install/wait/uninstall cycles until the
/// quota is met or the token is cancelled.
///
/// Runs on the calling thread. Every sleep goes through the [`Pacer`] with
/// the shared token, and the token is re-checked at each phase boundary.
pub struct BatchScheduler<E, P, R> {
    config: ScheduleConfig,
    catalog: ItemCatalog,
    executor: E,
    pacer: P,
    rng: R,
    token: CancellationToken,
    progress: ScheduleProgress,
    phase: SchedulerPhase,
}

impl<E, P, R> BatchScheduler<E, P, R>
where
    E: PackageOperationExecutor,
    P: Pacer,
    R: Rng,
{
    pub fn new(
        config: ScheduleConfig,
        catalog: ItemCatalog,
        executor: E,
        pacer: P,
        rng: R,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            catalog,
            executor,
            pacer,
            rng,
            token,
            progress: ScheduleProgress::default(),
            phase: SchedulerPhase::Updating,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn progress(&self) -> ScheduleProgress {
        self.progress
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    pub fn run(&mut self) -> RunSummary {
        info!("pkgcycle scheduler started");
        self.phase = SchedulerPhase::Updating;
        let update_succeeded = self.refresh_index();

        let total_quota = self.config.total_items.sample(&mut self.rng);
        self.progress = ScheduleProgress {
            total_quota,
            processed_count: 0,
            batch_number: 0,
        };
        info!("Total items to process: {total_quota}");

        let mut batches = Vec::new();
        let outcome = loop {
            self.phase = SchedulerPhase::SelectingBatch;
            if self.token.is_cancelled() {
                info!("Shutdown requested, stopping before the next batch");
                break RunOutcome::Stopped;
            }
            if self.progress.is_complete() {
                break RunOutcome::Completed;
            }

            let mut batch = self.select_batch();
            let install = self.run_phase(PackageOperation::Install, &batch);
            batch.phase = BatchPhase::Installed;
            let mut report = BatchReport {
                sequence_number: batch.sequence_number,
                size: batch.size,
                items: batch.items.clone(),
                install,
                uninstall: None,
            };

            if self.token.is_cancelled() {
                info!("Shutdown requested after installing batch {}", batch.sequence_number);
                batches.push(report);
                break RunOutcome::Stopped;
            }

            self.phase = SchedulerPhase::Waiting;
            batch.phase = BatchPhase::Waiting;
            if self.wait_after_install() == PauseOutcome::Cancelled {
                info!(
                    "Shutdown requested while waiting, batch {} left installed",
                    batch.sequence_number
                );
                batches.push(report);
                break RunOutcome::Stopped;
            }

            let uninstall = self.run_phase(PackageOperation::Remove, &batch);
            batch.phase = BatchPhase::Uninstalled;
            report.uninstall = Some(uninstall);
            batches.push(report);

            self.progress.processed_count += batch.size;
            self.progress.batch_number += 1;
            info!(
                "Batch {} finished, progress {}/{}",
                batch.sequence_number, self.progress.processed_count, self.progress.total_quota
            );

            let cadence = self.config.cleanup_every_batches;
            if cadence > 0 && self.progress.batch_number % cadence == 0 && !self.token.is_cancelled()
            {
                self.phase = SchedulerPhase::PeriodicCleanup;
                self.cleanup_best_effort();
            }

            if !self.progress.is_complete()
                && !self.token.is_cancelled()
                && self.wait_between_batches() == PauseOutcome::Cancelled
            {
                info!("Shutdown requested while waiting for the next batch");
                break RunOutcome::Stopped;
            }
        };

        self.finish(outcome, update_succeeded, batches)
    }

    fn refresh_index(&mut self) -> bool {
        info!("Updating package index...");
        let outcome = self.executor.update(self.config.update_timeout());
        if outcome.is_success() {
            info!("Package index updated");
        } else {
            warn!(
                status = ?outcome.status,
                "Package index update failed, continuing anyway: {}",
                outcome.detail
            );
        }
        outcome.is_success()
    }

    fn select_batch(&mut self) -> Batch {
        let drawn = self.config.batch_size.sample(&mut self.rng);
        let size = clamp_batch_size(drawn, &self.progress);
        let items = self.catalog.sample(&mut self.rng, size as usize);
        let sequence_number = self.progress.batch_number + 1;

        info!("{RULE}");
        info!("Starting batch {sequence_number}");
        info!("Batch size: {size} items");
        info!(
            "Progress: {}/{} items",
            self.progress.processed_count, self.progress.total_quota
        );
        info!("Selected items: {}", items.join(", "));

        Batch {
            sequence_number,
            size,
            items,
            phase: BatchPhase::Selected,
        }
    }

    /// One whole-batch call, then a single per-item pass if it failed.
    fn run_phase(&mut self, operation: PackageOperation, batch: &Batch) -> PhaseReport {
        let (batch_timeout, item_timeout) = match operation {
            PackageOperation::Install => {
                self.phase = SchedulerPhase::Installing;
                (
                    self.config.install_batch_timeout(),
                    self.config.install_item_timeout(),
                )
            }
            PackageOperation::Remove => {
                self.phase = SchedulerPhase::Uninstalling;
                (
                    self.config.remove_batch_timeout(),
                    self.config.remove_item_timeout(),
                )
            }
        };

        let verb = operation.verb();
        let attempted = batch.items.len();
        info!(
            "Running {verb} for batch {}: {attempted} items",
            batch.sequence_number
        );

        let whole = match operation {
            PackageOperation::Install => self.executor.install(&batch.items, batch_timeout),
            PackageOperation::Remove => self.executor.remove(&batch.items, batch_timeout),
        };
        if whole.is_success() {
            info!("Batch {} {verb} succeeded", batch.sequence_number);
            return PhaseReport {
                attempted,
                succeeded: attempted,
                mode: PhaseMode::WholeBatch,
            };
        }

        warn!(
            status = ?whole.status,
            "Batch {} {verb} had issues, retrying items individually: {}",
            batch.sequence_number,
            whole.detail
        );
        let mut succeeded = 0;
        for item in &batch.items {
            if self.token.is_cancelled() {
                info!("Shutdown requested, skipping remaining single-item {verb}s");
                break;
            }
            let outcome = match operation {
                PackageOperation::Install => self.executor.install_one(item, item_timeout),
                PackageOperation::Remove => self.executor.remove_one(item, item_timeout),
            };
            if outcome.is_success() {
                succeeded += 1;
            } else {
                warn!(status = ?outcome.status, "  Failed to {verb} {item}: {}", outcome.detail);
            }
        }

        let report = PhaseReport {
            attempted,
            succeeded,
            mode: PhaseMode::PerItemFallback,
        };
        match operation {
            PackageOperation::Install => info!("  Individual installs: {}", report.describe()),
            PackageOperation::Remove => info!("  Individual removals: {}", report.describe()),
        }
        report
    }

    fn wait_after_install(&mut self) -> PauseOutcome {
        let minutes = self.config.install_wait_minutes.sample(&mut self.rng);
        let jitter = self
            .config
            .install_wait_jitter_seconds
            .sample(&mut self.rng);
        let wait = Duration::from_secs(minutes.saturating_mul(60).saturating_add(jitter));
        info!("Waiting {minutes} minutes before uninstalling...");
        self.pacer.pause(wait, &self.token)
    }

    fn wait_between_batches(&mut self) -> PauseOutcome {
        let seconds = self.config.inter_batch_wait_seconds.sample(&mut self.rng);
        info!("Waiting {seconds} seconds before the next batch...");
        self.pacer.pause(Duration::from_secs(seconds), &self.token)
    }

    fn cleanup_best_effort(&mut self) {
        info!("Performing system cleanup...");
        let outcome = self.executor.cleanup(self.config.autoremove_timeout());
        if outcome.is_success() {
            info!("System cleanup completed");
        } else {
            warn!(status = ?outcome.status, "Cleanup had issues: {}", outcome.detail);
        }
    }

    fn finish(
        &mut self,
        outcome: RunOutcome,
        update_succeeded: bool,
        batches: Vec<BatchReport>,
    ) -> RunSummary {
        info!("{RULE}");
        match outcome {
            RunOutcome::Completed => info!("ALL BATCHES COMPLETED"),
            RunOutcome::Stopped => info!("PROCESS STOPPED BY REQUEST"),
        }
        info!("Total batches processed: {}", self.progress.batch_number);
        info!(
            "Total items installed/uninstalled: {}",
            self.progress.processed_count
        );

        self.cleanup_best_effort();
        self.phase = match outcome {
            RunOutcome::Completed => SchedulerPhase::Completed,
            RunOutcome::Stopped => SchedulerPhase::Stopped,
        };

        RunSummary {
            outcome,
            progress: self.progress,
            update_succeeded,
            batches,
        }
    }
}

/// Shrinks a drawn size so the batch never carries progress past the quota.
pub fn clamp_batch_size(drawn: u64, progress: &ScheduleProgress) -> u64 {
    drawn.min(progress.remaining())
}
