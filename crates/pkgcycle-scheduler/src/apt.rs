use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use pkgcycle_core::ScheduleConfig;
use tracing::{debug, warn};

use crate::executor::{OperationOutcome, PackageOperationExecutor};
use crate::pacing::deadline_after;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs operations through an apt-compatible command line tool.
#[derive(Debug, Clone)]
pub struct AptExecutor {
    program: String,
    autoclean_timeout: Duration,
}

impl AptExecutor {
    pub fn new(program: impl Into<String>, autoclean_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            autoclean_timeout,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.package_manager.clone(), config.autoclean_timeout())
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl PackageOperationExecutor for AptExecutor {
    fn update(&mut self, timeout: Duration) -> OperationOutcome {
        run_with_timeout(&mut build_update_command(&self.program), timeout)
    }

    fn install(&mut self, items: &[String], timeout: Duration) -> OperationOutcome {
        run_with_timeout(&mut build_install_command(&self.program, items), timeout)
    }

    fn remove(&mut self, items: &[String], timeout: Duration) -> OperationOutcome {
        run_with_timeout(&mut build_remove_command(&self.program, items), timeout)
    }

    fn cleanup(&mut self, timeout: Duration) -> OperationOutcome {
        let autoremove = run_with_timeout(&mut build_autoremove_command(&self.program), timeout);
        let autoclean = run_with_timeout(
            &mut build_autoclean_command(&self.program),
            self.autoclean_timeout,
        );
        if !autoremove.is_success() {
            return autoremove;
        }
        autoclean
    }
}

pub(crate) fn build_update_command(program: &str) -> Command {
    package_command(program, ["update"])
}

pub(crate) fn build_install_command(program: &str, items: &[String]) -> Command {
    let mut command = package_command(program, ["install", "-y"]);
    command.args(items);
    command
}

pub(crate) fn build_remove_command(program: &str, items: &[String]) -> Command {
    let mut command = package_command(program, ["remove", "-y"]);
    command.args(items);
    command
}

pub(crate) fn build_autoremove_command(program: &str) -> Command {
    package_command(program, ["autoremove", "-y"])
}

pub(crate) fn build_autoclean_command(program: &str) -> Command {
    package_command(program, ["autoclean"])
}

fn package_command<const N: usize>(program: &str, args: [&str; N]) -> Command {
    let mut command = Command::new(program);
    command
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

/// Runs `command` to completion or kills it once `timeout` expires.
///
/// Output pipes are drained on helper threads so a chatty child cannot block
/// on a full pipe while we poll it.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> OperationOutcome {
    debug!(?command, timeout_secs = timeout.as_secs(), "running package operation");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return OperationOutcome::spawn_failed(&format!(
                "failed to start {:?}: {err}",
                command.get_program()
            ));
        }
    };

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let status = match wait_with_deadline(&mut child, timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            // readers may never finish if grandchildren still hold the pipes
            return OperationOutcome::timed_out(timeout);
        }
        Err(err) => {
            return OperationOutcome::failed(None, &format!("failed waiting for child: {err}"));
        }
    };

    if status.success() {
        return OperationOutcome::succeeded();
    }

    let stderr = stderr.map(join_output).unwrap_or_default();
    let stdout = stdout.map(join_output).unwrap_or_default();
    let detail = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    OperationOutcome::failed(status.code(), &detail)
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = deadline_after(timeout);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            if let Err(err) = child.kill() {
                warn!("failed to kill timed out package operation: {err}");
            }
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(WAIT_POLL_INTERVAL.min(deadline - now));
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_output(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}
