use std::time::Duration;

/// Diagnostic text kept from a failed operation.
pub const DIAGNOSTIC_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded,
    Failed { code: Option<i32> },
    TimedOut,
    SpawnFailed,
}

/// Reported result of one package-manager call. Never a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub status: OperationStatus,
    pub detail: String,
}

impl OperationOutcome {
    pub fn succeeded() -> Self {
        Self {
            status: OperationStatus::Succeeded,
            detail: String::new(),
        }
    }

    pub fn failed(code: Option<i32>, detail: &str) -> Self {
        Self {
            status: OperationStatus::Failed { code },
            detail: truncate_diagnostic(detail),
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            status: OperationStatus::TimedOut,
            detail: format!("timed out after {}s", timeout.as_secs()),
        }
    }

    pub fn spawn_failed(detail: &str) -> Self {
        Self {
            status: OperationStatus::SpawnFailed,
            detail: truncate_diagnostic(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Succeeded
    }
}

pub fn truncate_diagnostic(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(DIAGNOSTIC_LIMIT) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

/// Package-manager operations the scheduler drives.
///
/// Single-item calls default to a one-element batch; implementations with a
/// cheaper per-item path can override them.
pub trait PackageOperationExecutor {
    fn update(&mut self, timeout: Duration) -> OperationOutcome;

    fn install(&mut self, items: &[String], timeout: Duration) -> OperationOutcome;

    fn install_one(&mut self, item: &str, timeout: Duration) -> OperationOutcome {
        self.install(&[item.to_string()], timeout)
    }

    fn remove(&mut self, items: &[String], timeout: Duration) -> OperationOutcome;

    fn remove_one(&mut self, item: &str, timeout: Duration) -> OperationOutcome {
        self.remove(&[item.to_string()], timeout)
    }

    fn cleanup(&mut self, timeout: Duration) -> OperationOutcome;
}
