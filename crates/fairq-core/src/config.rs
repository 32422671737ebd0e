use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How the delay before a failed task is requeued grows with each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffMode {
    /// Every retry waits `retry_delay_ms`.
    #[default]
    Fixed,
    /// Retry n waits `retry_delay_ms * 2^(n-1)`, capped at `max_delay_ms`.
    Exponential,
}

/// Retry backoff parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub backoff: BackoffMode,
    /// Upper bound on any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffMode::Fixed,
            max_delay_ms: 30_000,
        }
    }
}

/// Scheduler configuration, loaded from `~/.config/fairq/config.toml`.
///
/// Limits set to 0 in the file mean "unlimited".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum tasks running at once across all queues.
    pub max_task_concurrent: Option<usize>,
    /// Maximum queues in the Running state at once.
    pub max_queue_concurrent: Option<usize>,
    /// Maximum total tasks held across all queues, checked when a queue is added.
    pub max_queue_size: Option<usize>,
    /// Start dispatching as soon as a queue is added.
    pub auto_start: bool,
    /// Delay before a failed task becomes eligible again, in milliseconds (0 = immediate).
    pub retry_delay_ms: u64,
    /// Weight queues by their priority; when off every queue weighs 1.
    pub priority_enabled: bool,
    /// Optional backoff shape; if missing, a fixed delay is used.
    pub retry: Option<RetryConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_task_concurrent: Some(6),
            max_queue_concurrent: Some(2),
            max_queue_size: None,
            auto_start: true,
            retry_delay_ms: 1000,
            priority_enabled: true,
            retry: None,
        }
    }
}

impl SchedulerConfig {
    /// Global running-task cap, `None` when unlimited.
    pub fn task_limit(&self) -> Option<usize> {
        self.max_task_concurrent.filter(|n| *n > 0)
    }

    /// Running-queue cap, `None` when unlimited.
    pub fn queue_limit(&self) -> Option<usize> {
        self.max_queue_concurrent.filter(|n| *n > 0)
    }

    /// Admission cap on total tasks, `None` when unlimited.
    pub fn size_limit(&self) -> Option<usize> {
        self.max_queue_size.filter(|n| *n > 0)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fairq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SchedulerConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SchedulerConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<SchedulerConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: SchedulerConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
