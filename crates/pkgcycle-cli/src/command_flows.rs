use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use pkgcycle_core::{CancellationToken, ItemCatalog, ScheduleConfig};
use pkgcycle_daemon::{
    detach, init_file_logging, read_log_tail, GuardStatus, LockInspection, ProcessGuard,
    RuntimeLayout, SignalCoordinator, StopController, StopOutcome,
};
use pkgcycle_scheduler::{AptExecutor, BatchScheduler, RunOutcome, RunSummary, TickPacer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info};

use crate::render::{render_status_line, OutputStyle, TerminalRenderer};

pub(crate) const CONFIRM_PROMPT: &str = "Start in background? (yes/NO): ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StartOptions {
    pub(crate) yes: bool,
    pub(crate) foreground: bool,
}

pub(crate) fn load_schedule_config(path: Option<&Path>) -> Result<ScheduleConfig> {
    match path {
        Some(path) => ScheduleConfig::load(path),
        None => Ok(ScheduleConfig::default()),
    }
}

pub(crate) fn load_catalog(config: &ScheduleConfig) -> Result<ItemCatalog> {
    match &config.catalog_path {
        Some(path) => ItemCatalog::load(path),
        None => Ok(ItemCatalog::builtin()),
    }
}

pub(crate) fn run_start_command(
    layout: &RuntimeLayout,
    config: ScheduleConfig,
    options: StartOptions,
) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let guard = ProcessGuard::new(layout.clone());
    match guard.check_existing()? {
        GuardStatus::RunningWithPid(pid) => {
            return Err(anyhow!(
                "another instance is already running (pid {pid}); check log file: {}; if it is not running, remove: {}",
                layout.log_path().display(),
                layout.lock_path().display()
            ));
        }
        GuardStatus::StaleLockRemoved { previous_pid } => {
            renderer.print_status("warn", &format_stale_lock_message(previous_pid));
        }
        GuardStatus::NotRunning => {}
    }

    let catalog = load_catalog(&config)?;
    renderer.print_section("pkgcycle");
    renderer.print_lines(&format_start_summary_lines(&config, catalog.len(), layout));

    if !options.yes {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        if !confirm_start(&mut stdin.lock(), &mut stdout)? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let pid = if options.foreground {
        renderer.print_status("step", "Running in the foreground");
        layout.ensure_root_dir()?;
        std::process::id()
    } else {
        renderer.print_status("step", "Starting in background...");
        println!("Check status: pkgcycle status");
        println!("Stop: pkgcycle stop");
        detach(layout)?.pid
    };

    run_scheduler(layout, &guard, pid, config, catalog)
}

fn run_scheduler(
    layout: &RuntimeLayout,
    guard: &ProcessGuard,
    pid: u32,
    config: ScheduleConfig,
    catalog: ItemCatalog,
) -> Result<()> {
    init_file_logging(&layout.log_path())?;

    let lock = guard.acquire(pid).inspect_err(|err| {
        error!("failed to record pid {pid}: {err:#}");
    })?;
    info!(pid, lock = %lock_display(guard), "pkgcycle started");

    let token = CancellationToken::new();
    let mut signals = SignalCoordinator::install(token.clone())?;
    let executor = AptExecutor::from_config(&config);
    let pacer = TickPacer::new(config.tick());
    let mut scheduler = BatchScheduler::new(
        config,
        catalog,
        executor,
        pacer,
        StdRng::from_os_rng(),
        token,
    );
    let summary = scheduler.run();
    signals.shutdown();

    info!("{}", format_run_summary(&summary));
    lock.release()?;
    Ok(())
}

fn lock_display(guard: &ProcessGuard) -> String {
    guard.lock_path().display().to_string()
}

pub(crate) fn format_run_summary(summary: &RunSummary) -> String {
    let outcome = match summary.outcome {
        RunOutcome::Completed => "completed",
        RunOutcome::Stopped => "stopped",
    };
    format!(
        "run {outcome}: batches={} items={}/{} update_ok={}",
        summary.progress.batch_number,
        summary.progress.processed_count,
        summary.progress.total_quota,
        summary.update_succeeded
    )
}

fn format_stale_lock_message(previous_pid: Option<u32>) -> String {
    match previous_pid {
        Some(pid) => format!("removed stale lock left by pid {pid}"),
        None => "removed unreadable lock file".to_string(),
    }
}

/// Asks for an explicit `yes`. Anything else, including end of input, declines.
pub(crate) fn confirm_start<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<bool> {
    output
        .write_all(CONFIRM_PROMPT.as_bytes())
        .context("failed writing confirmation prompt")?;
    output.flush().context("failed flushing confirmation prompt")?;

    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .context("failed reading confirmation answer")?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

pub(crate) fn format_start_summary_lines(
    config: &ScheduleConfig,
    catalog_len: usize,
    layout: &RuntimeLayout,
) -> Vec<String> {
    let (min_hours, max_hours) = estimate_run_hours(config);
    vec![
        "This runs in the background and:".to_string(),
        "1. Updates the package index once".to_string(),
        format!(
            "2. Processes {}-{} items in total",
            config.total_items.min, config.total_items.max
        ),
        format!(
            "3. Works in batches of {}-{} items drawn from {catalog_len} candidates",
            config.batch_size.min, config.batch_size.max
        ),
        "4. For each batch:".to_string(),
        "   - Installs the batch".to_string(),
        format!(
            "   - Waits {}-{} minutes",
            config.install_wait_minutes.min, config.install_wait_minutes.max
        ),
        "   - Uninstalls the batch".to_string(),
        format!(
            "   - Pauses {}-{} seconds before the next one",
            config.inter_batch_wait_seconds.min, config.inter_batch_wait_seconds.max
        ),
        format!(
            "5. Cleans up every {} batches",
            config.cleanup_every_batches
        ),
        format!("Estimated time: {min_hours:.1} to {max_hours:.1} hours"),
        format!("Log file: {}", layout.log_path().display()),
        format!("PID file: {}", layout.lock_path().display()),
    ]
}

/// Shortest and longest plausible run, ignoring package-manager time.
pub(crate) fn estimate_run_hours(config: &ScheduleConfig) -> (f64, f64) {
    let fewest = config
        .total_items
        .min
        .div_ceil(config.batch_size.max.max(1));
    let most = config
        .total_items
        .max
        .div_ceil(config.batch_size.min.max(1));

    let span = |batches: u64, minutes: u64, jitter: u64, gap: u64| {
        let wait = minutes.saturating_mul(60).saturating_add(jitter);
        batches
            .saturating_mul(wait)
            .saturating_add(batches.saturating_sub(1).saturating_mul(gap))
    };
    let shortest = span(
        fewest,
        config.install_wait_minutes.min,
        config.install_wait_jitter_seconds.min,
        config.inter_batch_wait_seconds.min,
    );
    let longest = span(
        most,
        config.install_wait_minutes.max,
        config.install_wait_jitter_seconds.max,
        config.inter_batch_wait_seconds.max,
    );

    (shortest as f64 / 3600.0, longest as f64 / 3600.0)
}

pub(crate) fn run_stop_command(layout: &RuntimeLayout, config: &ScheduleConfig) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let controller =
        StopController::new(ProcessGuard::new(layout.clone())).with_grace(config.stop_grace());

    let spinner = renderer.start_spinner("Stopping background process...");
    if spinner.is_none() {
        println!("Stopping background process...");
    }
    let outcome = controller.stop();
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    renderer.print_lines(&format_stop_outcome_lines(&outcome?, renderer.style()));
    Ok(())
}

pub(crate) fn format_stop_outcome_lines(outcome: &StopOutcome, style: OutputStyle) -> Vec<String> {
    match outcome {
        StopOutcome::NothingRunning => {
            vec![render_status_line(style, "warn", "No process is running")]
        }
        StopOutcome::CorruptLockRemoved { reason } => vec![render_status_line(
            style,
            "warn",
            &format!("Invalid PID file removed ({reason})"),
        )],
        StopOutcome::AlreadyExited { pid } => vec![render_status_line(
            style,
            "warn",
            &format!("Process {pid} was not running, removed its PID file"),
        )],
        StopOutcome::Terminated { pid } => vec![
            render_status_line(style, "step", &format!("Sent stop signal to process {pid}")),
            render_status_line(style, "ok", "Process stopped successfully"),
        ],
        StopOutcome::Killed { pid } => vec![
            render_status_line(style, "step", &format!("Sent stop signal to process {pid}")),
            render_status_line(style, "warn", "Process still running, sent SIGKILL"),
            render_status_line(style, "ok", "Process stopped successfully"),
        ],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum InstanceState {
    Running,
    NotRunning,
    Stale,
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) state: InstanceState,
    pub(crate) pid: Option<u32>,
    pub(crate) acquired_at_unix: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) lock_problem: Option<String>,
    pub(crate) lock_path: String,
    pub(crate) log_path: String,
    pub(crate) log_tail: Option<Vec<String>>,
}

/// Reads the lock and log without modifying either.
pub(crate) fn build_status_report(layout: &RuntimeLayout, lines: usize) -> Result<StatusReport> {
    let guard = ProcessGuard::new(layout.clone());
    let (state, record, lock_problem) = match guard.inspect()? {
        LockInspection::Missing => (InstanceState::NotRunning, None, None),
        LockInspection::Live(record) => (InstanceState::Running, Some(record), None),
        LockInspection::Stale(record) => (InstanceState::Stale, Some(record), None),
        LockInspection::Corrupt { reason } => (InstanceState::Corrupt, None, Some(reason)),
    };

    Ok(StatusReport {
        state,
        pid: record.as_ref().map(|record| record.process_id),
        acquired_at_unix: record.and_then(|record| record.acquired_at_unix),
        lock_problem,
        lock_path: layout.lock_path().display().to_string(),
        log_path: layout.log_path().display().to_string(),
        log_tail: read_log_tail(&layout.log_path(), lines)?,
    })
}

pub(crate) fn format_status_lines(
    report: &StatusReport,
    style: OutputStyle,
    now_unix: u64,
) -> Vec<String> {
    let mut lines = vec![match report.state {
        InstanceState::Running => render_status_line(style, "ok", "Background process is RUNNING"),
        InstanceState::NotRunning => {
            render_status_line(style, "warn", "Background process is NOT running")
        }
        InstanceState::Stale => render_status_line(
            style,
            "warn",
            "Background process is NOT running (stale PID file left behind)",
        ),
        InstanceState::Corrupt => render_status_line(
            style,
            "err",
            &format!(
                "Background process state unknown ({})",
                report.lock_problem.as_deref().unwrap_or("unreadable PID file")
            ),
        ),
    }];

    lines.push(format!("Log file: {}", report.log_path));
    match &report.log_tail {
        Some(tail) => {
            lines.push(String::new());
            lines.push(format!("Last {} lines of log:", tail.len()));
            lines.extend(tail.iter().cloned());
        }
        None => lines.push("Log file not created yet".to_string()),
    }

    lines.push(String::new());
    lines.push(format!("PID file: {}", report.lock_path));
    if let Some(pid) = report.pid {
        lines.push(format!("Process ID: {pid}"));
    }
    if report.state == InstanceState::Running {
        if let Some(acquired) = report.acquired_at_unix {
            lines.push(format!(
                "Running for: {}",
                format_uptime(now_unix.saturating_sub(acquired))
            ));
        }
    }
    lines
}

pub(crate) fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else {
        format!("{minutes}m {seconds:02}s")
    }
}

pub(crate) fn run_status_command(layout: &RuntimeLayout, lines: usize, json: bool) -> Result<()> {
    let report = build_status_report(layout, lines)?;
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to encode status report")?;
        println!("{rendered}");
        return Ok(());
    }

    let renderer = TerminalRenderer::current();
    let now_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    renderer.print_lines(&format_status_lines(&report, renderer.style(), now_unix));
    Ok(())
}
