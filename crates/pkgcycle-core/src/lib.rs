mod cancel;
mod catalog;
mod config;

pub use cancel::CancellationToken;
pub use catalog::ItemCatalog;
pub use config::{
    InclusiveRange, ScheduleConfig, DEFAULT_BATCH_SIZE, DEFAULT_CLEANUP_EVERY_BATCHES,
    DEFAULT_INSTALL_WAIT_JITTER_SECONDS, DEFAULT_INSTALL_WAIT_MINUTES,
    DEFAULT_INTER_BATCH_WAIT_SECONDS, DEFAULT_TICK_SECONDS, DEFAULT_TOTAL_ITEMS,
    MAX_DURATION_SECONDS,
};
