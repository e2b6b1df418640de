mod detach;
mod fs_utils;
mod layout;
mod lock;
mod logging;
mod process;
mod signals;
mod stop;

pub use detach::{detach, DaemonHandle};
pub use layout::{RuntimeLayout, DEFAULT_RUNTIME_DIR, LOCK_FILE_NAME, LOG_FILE_NAME};
pub use logging::{init_file_logging, read_log_tail, LOG_ENV_VAR};
pub use lock::{parse_lock_pid, GuardStatus, LockGuard, LockInspection, LockRecord, ProcessGuard};
pub use process::{process_exists, ProcessSignaller, SystemSignaller};
pub use signals::SignalCoordinator;
pub use stop::{StopController, StopOutcome, DEFAULT_STOP_GRACE};
