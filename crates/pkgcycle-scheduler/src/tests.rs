use std::collections::HashSet;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use pkgcycle_core::{CancellationToken, InclusiveRange, ItemCatalog, ScheduleConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::*;
use crate::apt::{
    build_autoclean_command, build_autoremove_command, build_install_command,
    build_remove_command, build_update_command,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Update,
    Install(Vec<String>),
    InstallOne(String),
    Remove(Vec<String>),
    RemoveOne(String),
    Cleanup,
}

#[derive(Default)]
struct ScriptedExecutor {
    calls: Vec<Call>,
    fail_update: bool,
    fail_batch_install: bool,
    fail_batch_remove: bool,
    failing_item_installs: usize,
    cancel_on_item_install: Option<CancellationToken>,
}

impl ScriptedExecutor {
    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    fn installs(&self) -> Vec<&Vec<String>> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Install(items) => Some(items),
                _ => None,
            })
            .collect()
    }
}

impl PackageOperationExecutor for ScriptedExecutor {
    fn update(&mut self, _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::Update);
        if self.fail_update {
            return OperationOutcome::failed(Some(100), "E: could not resolve mirror");
        }
        OperationOutcome::succeeded()
    }

    fn install(&mut self, items: &[String], _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::Install(items.to_vec()));
        if self.fail_batch_install {
            return OperationOutcome::failed(Some(100), "E: Unable to locate package");
        }
        OperationOutcome::succeeded()
    }

    fn install_one(&mut self, item: &str, _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::InstallOne(item.to_string()));
        if let Some(token) = &self.cancel_on_item_install {
            token.cancel();
        }
        if self.failing_item_installs > 0 {
            self.failing_item_installs -= 1;
            return OperationOutcome::failed(Some(100), "E: Unable to locate package");
        }
        OperationOutcome::succeeded()
    }

    fn remove(&mut self, items: &[String], _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::Remove(items.to_vec()));
        if self.fail_batch_remove {
            return OperationOutcome::timed_out(Duration::from_secs(600));
        }
        OperationOutcome::succeeded()
    }

    fn remove_one(&mut self, item: &str, _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::RemoveOne(item.to_string()));
        OperationOutcome::succeeded()
    }

    fn cleanup(&mut self, _timeout: Duration) -> OperationOutcome {
        self.calls.push(Call::Cleanup);
        OperationOutcome::succeeded()
    }
}

/// Records requested pauses without sleeping. Cancels the token on the
/// `cancel_on`-th pause (1-based) to simulate a stop request mid-wait.
#[derive(Default)]
struct RecordingPacer {
    pauses: Vec<Duration>,
    cancel_on: Option<usize>,
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, duration: Duration, token: &CancellationToken) -> PauseOutcome {
        self.pauses.push(duration);
        if self.cancel_on == Some(self.pauses.len()) {
            token.cancel();
            return PauseOutcome::Cancelled;
        }
        PauseOutcome::Elapsed
    }
}

type TestScheduler = BatchScheduler<ScriptedExecutor, RecordingPacer, StdRng>;

fn fixed_config(total: u64, batch: u64) -> ScheduleConfig {
    ScheduleConfig {
        total_items: InclusiveRange::new(total, total),
        batch_size: InclusiveRange::new(batch, batch),
        ..ScheduleConfig::default()
    }
}

fn scheduler(
    config: ScheduleConfig,
    catalog: ItemCatalog,
    executor: ScriptedExecutor,
    pacer: RecordingPacer,
    seed: u64,
) -> (TestScheduler, CancellationToken) {
    let token = CancellationToken::new();
    let scheduler = BatchScheduler::new(
        config,
        catalog,
        executor,
        pacer,
        StdRng::seed_from_u64(seed),
        token.clone(),
    );
    (scheduler, token)
}

#[test]
fn default_runs_meet_quota_exactly() {
    for seed in 0..16 {
        let (mut scheduler, _token) = scheduler(
            ScheduleConfig::default(),
            ItemCatalog::builtin(),
            ScriptedExecutor::default(),
            RecordingPacer::default(),
            seed,
        );
        let summary = scheduler.run();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        let quota = summary.progress.total_quota;
        assert!((161..=199).contains(&quota), "seed {seed}: quota {quota}");
        assert_eq!(summary.progress.processed_count, quota);
        assert_eq!(summary.progress.batch_number, summary.batches.len() as u64);

        let sizes: Vec<u64> = summary.batches.iter().map(|batch| batch.size).collect();
        assert_eq!(sizes.iter().sum::<u64>(), quota);
        let (last, rest) = sizes.split_last().expect("at least one batch");
        assert!(rest.iter().all(|size| (5..=14).contains(size)), "seed {seed}: {sizes:?}");
        assert!((1..=14).contains(last));

        for (index, batch) in summary.batches.iter().enumerate() {
            assert_eq!(batch.sequence_number, index as u64 + 1);
            assert_eq!(batch.items.len() as u64, batch.size);
            let distinct: HashSet<&String> = batch.items.iter().collect();
            assert_eq!(distinct.len(), batch.items.len());
        }
    }
}

#[test]
fn final_batch_is_clamped_to_remaining_quota() {
    let (mut scheduler, _token) = scheduler(
        fixed_config(161, 14),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        7,
    );
    let summary = scheduler.run();

    assert_eq!(summary.batches.len(), 12);
    assert!(summary.batches[..11].iter().all(|batch| batch.size == 14));
    assert_eq!(summary.batches[11].size, 7);
    assert_eq!(summary.progress.processed_count, 161);
    assert_eq!(scheduler.phase(), SchedulerPhase::Completed);
}

#[test]
fn failed_batch_install_falls_back_to_single_items() {
    let executor = ScriptedExecutor {
        fail_batch_install: true,
        failing_item_installs: 3,
        ..ScriptedExecutor::default()
    };
    let (mut scheduler, _token) = scheduler(
        fixed_config(10, 10),
        ItemCatalog::builtin(),
        executor,
        RecordingPacer::default(),
        1,
    );
    let summary = scheduler.run();

    let report = &summary.batches[0];
    assert_eq!(report.install.mode, PhaseMode::PerItemFallback);
    assert_eq!(report.install.attempted, 10);
    assert_eq!(report.install.succeeded, 7);
    assert_eq!(report.install.describe(), "7/10 successful");
    assert!(report.install.made_progress());

    let executor = scheduler.executor();
    assert_eq!(executor.count(|call| matches!(call, Call::InstallOne(_))), 10);
    // removal still targets the whole batch, including items that never installed
    let removed = executor
        .calls
        .iter()
        .find_map(|call| match call {
            Call::Remove(items) => Some(items.clone()),
            _ => None,
        })
        .expect("batch removal should run");
    assert_eq!(&removed, executor.installs()[0]);
    assert_eq!(report.uninstall.map(|r| r.mode), Some(PhaseMode::WholeBatch));
}

#[test]
fn failed_batch_remove_retries_each_item() {
    let executor = ScriptedExecutor {
        fail_batch_remove: true,
        ..ScriptedExecutor::default()
    };
    let (mut scheduler, _token) = scheduler(
        fixed_config(6, 6),
        ItemCatalog::builtin(),
        executor,
        RecordingPacer::default(),
        3,
    );
    let summary = scheduler.run();

    let uninstall = summary.batches[0].uninstall.expect("removal should run");
    assert_eq!(uninstall.mode, PhaseMode::PerItemFallback);
    assert_eq!(uninstall.describe(), "6/6 successful");
    assert_eq!(
        scheduler
            .executor()
            .count(|call| matches!(call, Call::RemoveOne(_))),
        6
    );
}

#[test]
fn stop_during_install_wait_skips_removal() {
    let pacer = RecordingPacer {
        cancel_on: Some(1),
        ..RecordingPacer::default()
    };
    let (mut scheduler, token) = scheduler(
        fixed_config(50, 5),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        pacer,
        11,
    );
    let summary = scheduler.run();

    assert!(token.is_cancelled());
    assert_eq!(summary.outcome, RunOutcome::Stopped);
    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.batches[0].uninstall, None);
    assert_eq!(summary.progress.processed_count, 0);
    assert_eq!(summary.progress.batch_number, 0);
    assert_eq!(scheduler.phase(), SchedulerPhase::Stopped);

    let executor = scheduler.executor();
    assert_eq!(executor.count(|call| matches!(call, Call::Remove(_))), 0);
    assert_eq!(executor.calls.last(), Some(&Call::Cleanup));
}

#[test]
fn stop_between_batches_ends_before_next_selection() {
    let pacer = RecordingPacer {
        cancel_on: Some(2),
        ..RecordingPacer::default()
    };
    let (mut scheduler, _token) = scheduler(
        fixed_config(50, 5),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        pacer,
        12,
    );
    let summary = scheduler.run();

    assert_eq!(summary.outcome, RunOutcome::Stopped);
    assert_eq!(summary.batches.len(), 1);
    assert_eq!(summary.progress.processed_count, 5);
    assert_eq!(summary.progress.batch_number, 1);
    assert_eq!(scheduler.executor().installs().len(), 1);
}

#[test]
fn stop_during_single_item_fallback_skips_remaining_items() {
    let token = CancellationToken::new();
    let executor = ScriptedExecutor {
        fail_batch_install: true,
        cancel_on_item_install: Some(token.clone()),
        ..ScriptedExecutor::default()
    };
    let mut scheduler = BatchScheduler::new(
        fixed_config(10, 10),
        ItemCatalog::builtin(),
        executor,
        RecordingPacer::default(),
        StdRng::seed_from_u64(17),
        token,
    );
    let summary = scheduler.run();

    assert_eq!(summary.outcome, RunOutcome::Stopped);
    let install = summary.batches[0].install;
    assert_eq!(install.mode, PhaseMode::PerItemFallback);
    assert_eq!(install.describe(), "1/10 successful");
    assert_eq!(summary.batches[0].uninstall, None);

    let executor = scheduler.executor();
    assert_eq!(executor.count(|call| matches!(call, Call::InstallOne(_))), 1);
    assert!(scheduler.pacer().pauses.is_empty());
}

#[test]
fn oversized_wait_saturates_instead_of_overflowing() {
    let config = ScheduleConfig {
        install_wait_minutes: InclusiveRange::new(
            307_445_734_561_825_861,
            307_445_734_561_825_861,
        ),
        install_wait_jitter_seconds: InclusiveRange::new(59, 59),
        ..fixed_config(5, 5)
    };
    let (mut scheduler, _token) = scheduler(
        config,
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        8,
    );
    let summary = scheduler.run();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(scheduler.pacer().pauses, vec![Duration::from_secs(u64::MAX)]);
}

#[test]
fn stop_before_first_batch_installs_nothing() {
    let (mut scheduler, token) = scheduler(
        ScheduleConfig::default(),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        5,
    );
    token.cancel();
    let summary = scheduler.run();

    assert_eq!(summary.outcome, RunOutcome::Stopped);
    assert!(summary.batches.is_empty());
    assert!(scheduler.executor().installs().is_empty());
    assert!(scheduler.pacer().pauses.is_empty());
}

#[test]
fn update_failure_does_not_abort_run() {
    let executor = ScriptedExecutor {
        fail_update: true,
        ..ScriptedExecutor::default()
    };
    let (mut scheduler, _token) = scheduler(
        fixed_config(10, 5),
        ItemCatalog::builtin(),
        executor,
        RecordingPacer::default(),
        9,
    );
    let summary = scheduler.run();

    assert!(!summary.update_succeeded);
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.batches.len(), 2);
    assert_eq!(scheduler.executor().calls.first(), Some(&Call::Update));
    assert_eq!(
        scheduler
            .executor()
            .count(|call| matches!(call, Call::Update)),
        1
    );
}

#[test]
fn cleanup_runs_every_fifth_batch_and_at_the_end() {
    let (mut scheduler, _token) = scheduler(
        fixed_config(50, 5),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        4,
    );
    let summary = scheduler.run();

    assert_eq!(summary.batches.len(), 10);
    let executor = scheduler.executor();
    assert_eq!(executor.count(|call| matches!(call, Call::Cleanup)), 3);

    // the first periodic cleanup follows the fifth removal
    let removes_before_cleanup = executor
        .calls
        .iter()
        .take_while(|call| **call != Call::Cleanup)
        .filter(|call| matches!(call, Call::Remove(_)))
        .count();
    assert_eq!(removes_before_cleanup, 5);
}

#[test]
fn pauses_follow_configured_ranges() {
    let (mut scheduler, _token) = scheduler(
        fixed_config(40, 8),
        ItemCatalog::builtin(),
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        21,
    );
    scheduler.run();

    let pauses = &scheduler.pacer().pauses;
    // five install waits and four gaps between batches
    assert_eq!(pauses.len(), 9);
    for (index, pause) in pauses.iter().enumerate() {
        let secs = pause.as_secs();
        if index % 2 == 0 {
            assert!((7 * 60..=16 * 60 + 59).contains(&secs), "install wait {secs}");
        } else {
            assert!((60..=180).contains(&secs), "inter-batch wait {secs}");
        }
    }
}

#[test]
fn small_catalog_still_counts_full_batch_size() {
    let catalog = ItemCatalog::from_names(["vim", "nano", "htop"]).expect("catalog");
    let (mut scheduler, _token) = scheduler(
        fixed_config(10, 5),
        catalog,
        ScriptedExecutor::default(),
        RecordingPacer::default(),
        2,
    );
    let summary = scheduler.run();

    assert_eq!(summary.batches.len(), 2);
    for batch in &summary.batches {
        assert_eq!(batch.size, 5);
        assert_eq!(batch.items.len(), 3);
    }
    assert_eq!(summary.progress.processed_count, 10);
}

#[test]
fn clamp_never_exceeds_remaining() {
    let progress = ScheduleProgress {
        total_quota: 161,
        processed_count: 154,
        batch_number: 11,
    };
    assert_eq!(clamp_batch_size(14, &progress), 7);
    assert_eq!(clamp_batch_size(5, &progress), 5);

    let done = ScheduleProgress {
        total_quota: 10,
        processed_count: 10,
        batch_number: 2,
    };
    assert_eq!(clamp_batch_size(9, &done), 0);
    assert!(done.is_complete());
}

#[test]
fn tick_pacer_observes_cancel_within_a_tick() {
    let token = CancellationToken::new();
    let mut pacer = TickPacer::new(Duration::from_millis(20));
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        remote.cancel();
    });

    let started = Instant::now();
    let outcome = pacer.pause(Duration::from_secs(30), &token);
    canceller.join().expect("canceller thread should finish");

    assert_eq!(outcome, PauseOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn tick_pacer_handles_unbounded_pause() {
    let token = CancellationToken::new();
    let mut pacer = TickPacer::new(Duration::from_millis(10));
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.cancel();
    });

    assert_eq!(pacer.pause(Duration::MAX, &token), PauseOutcome::Cancelled);
    canceller.join().expect("canceller thread should finish");
}

#[test]
fn tick_pacer_elapses_short_pause() {
    let token = CancellationToken::new();
    let mut pacer = TickPacer::new(Duration::from_secs(10));

    let started = Instant::now();
    assert_eq!(
        pacer.pause(Duration::from_millis(30), &token),
        PauseOutcome::Elapsed
    );
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(TickPacer::new(Duration::ZERO).tick(), Duration::from_millis(1));
}

fn args(command: &Command) -> Vec<String> {
    command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[test]
fn apt_commands_are_non_interactive() {
    let items = vec!["vim".to_string(), "htop".to_string()];

    let install = build_install_command("apt", &items);
    assert_eq!(install.get_program(), "apt");
    assert_eq!(args(&install), ["install", "-y", "vim", "htop"]);
    let frontend = install
        .get_envs()
        .find(|(key, _)| *key == "DEBIAN_FRONTEND")
        .and_then(|(_, value)| value);
    assert_eq!(frontend, Some(std::ffi::OsStr::new("noninteractive")));

    assert_eq!(args(&build_remove_command("apt-get", &items)), ["remove", "-y", "vim", "htop"]);
    assert_eq!(args(&build_update_command("apt")), ["update"]);
    assert_eq!(args(&build_autoremove_command("apt")), ["autoremove", "-y"]);
    assert_eq!(args(&build_autoclean_command("apt")), ["autoclean"]);
    assert_eq!(AptExecutor::from_config(&ScheduleConfig::default()).program(), "apt");
}

#[test]
fn run_with_timeout_reports_success() {
    let outcome = run_with_timeout(&mut Command::new("true"), Duration::from_secs(5));
    assert!(outcome.is_success());
}

#[test]
fn run_with_timeout_accepts_unbounded_timeout() {
    let outcome = run_with_timeout(
        &mut Command::new("true"),
        Duration::from_secs(u64::MAX / 2),
    );
    assert!(outcome.is_success());
}

#[test]
fn run_with_timeout_reports_exit_code_and_stderr() {
    let mut command = Command::new("sh");
    command
        .args(["-c", "echo broken mirror >&2; exit 3"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    let outcome = run_with_timeout(&mut command, Duration::from_secs(5));

    assert_eq!(outcome.status, OperationStatus::Failed { code: Some(3) });
    assert_eq!(outcome.detail, "broken mirror");
}

#[test]
fn run_with_timeout_falls_back_to_stdout_detail() {
    let mut command = Command::new("sh");
    command
        .args(["-c", "echo only stdout; exit 1"])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());
    let outcome = run_with_timeout(&mut command, Duration::from_secs(5));

    assert_eq!(outcome.status, OperationStatus::Failed { code: Some(1) });
    assert_eq!(outcome.detail, "only stdout");
}

#[test]
fn run_with_timeout_kills_slow_child() {
    let mut command = Command::new("sleep");
    command.arg("5");
    let started = Instant::now();
    let outcome = run_with_timeout(&mut command, Duration::from_millis(100));

    assert_eq!(outcome.status, OperationStatus::TimedOut);
    assert!(outcome.detail.starts_with("timed out after"));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn run_with_timeout_reports_missing_program() {
    let outcome = run_with_timeout(
        &mut Command::new("pkgcycle-definitely-missing-binary"),
        Duration::from_secs(1),
    );
    assert_eq!(outcome.status, OperationStatus::SpawnFailed);
    assert!(outcome.detail.contains("failed to start"));
}

#[test]
fn diagnostics_are_truncated_on_char_boundaries() {
    let long = "é".repeat(DIAGNOSTIC_LIMIT + 50);
    let truncated = truncate_diagnostic(&long);
    assert_eq!(truncated.chars().count(), DIAGNOSTIC_LIMIT + 3);
    assert!(truncated.ends_with("..."));

    assert_eq!(truncate_diagnostic("  short  \n"), "short");
}
