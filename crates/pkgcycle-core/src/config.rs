use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]` sampled uniformly.
///
/// Serialized as a two element array so config files read `batch_size = [5, 14]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct InclusiveRange {
    pub min: u64,
    pub max: u64,
}

impl InclusiveRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.min >= self.max {
            return self.min;
        }
        rng.random_range(self.min..=self.max)
    }

    fn validate(&self, field: &str) -> anyhow::Result<()> {
        if self.min > self.max {
            return Err(anyhow!(
                "{field} range is inverted: [{}, {}]",
                self.min,
                self.max
            ));
        }
        Ok(())
    }
}

impl From<[u64; 2]> for InclusiveRange {
    fn from(value: [u64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<InclusiveRange> for [u64; 2] {
    fn from(value: InclusiveRange) -> Self {
        [value.min, value.max]
    }
}

pub const DEFAULT_TOTAL_ITEMS: InclusiveRange = InclusiveRange::new(161, 199);
pub const DEFAULT_BATCH_SIZE: InclusiveRange = InclusiveRange::new(5, 14);
pub const DEFAULT_INSTALL_WAIT_MINUTES: InclusiveRange = InclusiveRange::new(7, 16);
pub const DEFAULT_INSTALL_WAIT_JITTER_SECONDS: InclusiveRange = InclusiveRange::new(0, 59);
pub const DEFAULT_INTER_BATCH_WAIT_SECONDS: InclusiveRange = InclusiveRange::new(60, 180);
pub const DEFAULT_CLEANUP_EVERY_BATCHES: u64 = 5;
pub const DEFAULT_TICK_SECONDS: u64 = 10;

/// Upper bound for every wait, tick and timeout: one week.
pub const MAX_DURATION_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Bounds and timeouts driving a scheduler run.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub total_items: InclusiveRange,
    pub batch_size: InclusiveRange,
    pub install_wait_minutes: InclusiveRange,
    pub install_wait_jitter_seconds: InclusiveRange,
    pub inter_batch_wait_seconds: InclusiveRange,
    pub cleanup_every_batches: u64,
    pub tick_seconds: u64,
    pub update_timeout_secs: u64,
    pub install_batch_timeout_secs: u64,
    pub install_item_timeout_secs: u64,
    pub remove_batch_timeout_secs: u64,
    pub remove_item_timeout_secs: u64,
    pub autoremove_timeout_secs: u64,
    pub autoclean_timeout_secs: u64,
    pub stop_grace_secs: u64,
    pub package_manager: String,
    pub catalog_path: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            total_items: DEFAULT_TOTAL_ITEMS,
            batch_size: DEFAULT_BATCH_SIZE,
            install_wait_minutes: DEFAULT_INSTALL_WAIT_MINUTES,
            install_wait_jitter_seconds: DEFAULT_INSTALL_WAIT_JITTER_SECONDS,
            inter_batch_wait_seconds: DEFAULT_INTER_BATCH_WAIT_SECONDS,
            cleanup_every_batches: DEFAULT_CLEANUP_EVERY_BATCHES,
            tick_seconds: DEFAULT_TICK_SECONDS,
            update_timeout_secs: 300,
            install_batch_timeout_secs: 900,
            install_item_timeout_secs: 300,
            remove_batch_timeout_secs: 600,
            remove_item_timeout_secs: 180,
            autoremove_timeout_secs: 300,
            autoclean_timeout_secs: 180,
            stop_grace_secs: 2,
            package_manager: "apt".to_string(),
            catalog_path: None,
        }
    }
}

impl ScheduleConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse pkgcycle config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config: {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.total_items.validate("total_items")?;
        self.batch_size.validate("batch_size")?;
        self.install_wait_minutes.validate("install_wait_minutes")?;
        self.install_wait_jitter_seconds
            .validate("install_wait_jitter_seconds")?;
        self.inter_batch_wait_seconds
            .validate("inter_batch_wait_seconds")?;

        if self.total_items.min == 0 {
            return Err(anyhow!("total_items must be at least 1"));
        }
        if self.batch_size.min == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if self.cleanup_every_batches == 0 {
            return Err(anyhow!("cleanup_every_batches must be at least 1"));
        }
        if self.tick_seconds == 0 {
            return Err(anyhow!("tick_seconds must be at least 1"));
        }
        if self.install_wait_minutes.max > MAX_DURATION_SECONDS / 60 {
            return Err(anyhow!(
                "install_wait_minutes must not exceed {} minutes",
                MAX_DURATION_SECONDS / 60
            ));
        }
        for (field, seconds) in [
            (
                "install_wait_jitter_seconds",
                self.install_wait_jitter_seconds.max,
            ),
            ("inter_batch_wait_seconds", self.inter_batch_wait_seconds.max),
            ("tick_seconds", self.tick_seconds),
            ("update_timeout_secs", self.update_timeout_secs),
            ("install_batch_timeout_secs", self.install_batch_timeout_secs),
            ("install_item_timeout_secs", self.install_item_timeout_secs),
            ("remove_batch_timeout_secs", self.remove_batch_timeout_secs),
            ("remove_item_timeout_secs", self.remove_item_timeout_secs),
            ("autoremove_timeout_secs", self.autoremove_timeout_secs),
            ("autoclean_timeout_secs", self.autoclean_timeout_secs),
            ("stop_grace_secs", self.stop_grace_secs),
        ] {
            if seconds > MAX_DURATION_SECONDS {
                return Err(anyhow!(
                    "{field} must not exceed {MAX_DURATION_SECONDS} seconds"
                ));
            }
        }
        if self.package_manager.trim().is_empty() {
            return Err(anyhow!("package_manager must not be empty"));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    pub fn install_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.install_batch_timeout_secs)
    }

    pub fn install_item_timeout(&self) -> Duration {
        Duration::from_secs(self.install_item_timeout_secs)
    }

    pub fn remove_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.remove_batch_timeout_secs)
    }

    pub fn remove_item_timeout(&self) -> Duration {
        Duration::from_secs(self.remove_item_timeout_secs)
    }

    pub fn autoremove_timeout(&self) -> Duration {
        Duration::from_secs(self.autoremove_timeout_secs)
    }

    pub fn autoclean_timeout(&self) -> Duration {
        Duration::from_secs(self.autoclean_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
