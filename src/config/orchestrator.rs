//! Orchestrator configuration structures.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Priority, ResourceKind, SessionMode};
use crate::util::jitter::Jitter;

/// Executor sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Hard cap on tasks in flight.
    pub max_workers: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get().clamp(2, 8),
        }
    }
}

/// Session pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPoolConfig {
    /// Directory holding one profile directory per account.
    pub profile_root: PathBuf,
    /// Release policy.
    #[serde(default)]
    pub mode: SessionMode,
    /// Request types every session aborts.
    #[serde(default = "default_blocked_resources")]
    pub blocked_resources: Vec<ResourceKind>,
}

fn default_blocked_resources() -> Vec<ResourceKind> {
    vec![ResourceKind::Image, ResourceKind::Media, ResourceKind::Font]
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            profile_root: PathBuf::from("profiles"),
            mode: SessionMode::Persistent,
            blocked_resources: default_blocked_resources(),
        }
    }
}

/// Interactive window admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum concurrently open interactive windows.
    pub max_windows: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_windows: 2 }
    }
}

/// Watchdog cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Seconds between watchdog ticks.
    pub tick_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { tick_secs: 30 }
    }
}

impl WatchdogConfig {
    /// Tick as a duration.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

/// Graceful shutdown budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Seconds to wait for in-flight tasks before clearing the queue.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 30,
        }
    }
}

impl ShutdownConfig {
    /// Drain timeout as a duration.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Outgoing-send pacing installed into every session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum delay before a queued send is released.
    pub min_delay_ms: u64,
    /// Maximum regular delay.
    pub max_delay_ms: u64,
    /// Probability of a longer "thinking" pause, `[0.0, 1.0]`.
    pub thinking_chance: f64,
    /// Minimum thinking pause.
    pub thinking_min_ms: u64,
    /// Maximum thinking pause.
    pub thinking_max_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 40,
            max_delay_ms: 220,
            thinking_chance: 0.08,
            thinking_min_ms: 800,
            thinking_max_ms: 2500,
        }
    }
}

/// One category loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Executor priority; lower runs first.
    pub priority: Priority,
    /// Nominal seconds between cycle starts.
    pub interval_secs: u64,
    /// Jitter ratio applied to the interval.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    /// Accounts dispatched together.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Nominal pause between batches, milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Wait after a successful run when the action reports none.
    pub default_wait_secs: u64,
    /// Wait after a failed run.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
    /// Disabled categories get no loop.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Longest accepted cycle interval: one week.
pub const MAX_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted pause between batches: one hour.
pub const MAX_BATCH_PAUSE_MS: u64 = 60 * 60 * 1000;

const fn default_jitter_ratio() -> f64 {
    0.2
}

const fn default_batch_size() -> usize {
    5
}

const fn default_batch_pause_ms() -> u64 {
    3_000
}

const fn default_failure_backoff_secs() -> u64 {
    300
}

const fn default_enabled() -> bool {
    true
}

impl CategoryConfig {
    /// Category with the given priority and cadence; other fields at defaults.
    #[must_use]
    pub const fn new(priority: Priority, interval_secs: u64) -> Self {
        Self {
            priority,
            interval_secs,
            jitter_ratio: default_jitter_ratio(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            default_wait_secs: interval_secs,
            failure_backoff_secs: default_failure_backoff_secs(),
            enabled: true,
        }
    }

    /// Jittered cycle interval.
    #[must_use]
    pub const fn interval(&self) -> Jitter {
        Jitter::new(Duration::from_secs(self.interval_secs), self.jitter_ratio)
    }

    /// Jittered inter-batch pause.
    #[must_use]
    pub const fn batch_pause(&self) -> Jitter {
        Jitter::new(Duration::from_millis(self.batch_pause_ms), self.jitter_ratio)
    }

    /// Wait after success without a reported wait.
    #[must_use]
    pub const fn default_wait(&self) -> Duration {
        Duration::from_secs(self.default_wait_secs)
    }

    /// Wait after failure.
    #[must_use]
    pub const fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    /// Validate category values.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval_secs must be greater than 0".into());
        }
        if self.interval_secs > MAX_INTERVAL_SECS {
            return Err(format!("interval_secs must not exceed {MAX_INTERVAL_SECS}"));
        }
        if self.batch_pause_ms > MAX_BATCH_PAUSE_MS {
            return Err(format!("batch_pause_ms must not exceed {MAX_BATCH_PAUSE_MS}"));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".into());
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err("jitter_ratio must be within [0, 1]".into());
        }
        Ok(())
    }
}

fn default_categories() -> BTreeMap<String, CategoryConfig> {
    BTreeMap::from([
        ("scavenging".to_string(), CategoryConfig::new(1, 5 * 60)),
        ("building".to_string(), CategoryConfig::new(2, 10 * 60)),
        ("recruiting".to_string(), CategoryConfig::new(3, 15 * 60)),
        ("farming".to_string(), CategoryConfig::new(4, 20 * 60)),
    ])
}

/// Root orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Executor sizing.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Session pool.
    #[serde(default)]
    pub sessions: SessionPoolConfig,
    /// Interactive window admission.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Watchdog cadence.
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    /// Shutdown budget.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Outgoing-send pacing.
    #[serde(default)]
    pub pacing: PacingConfig,
    /// Category loops by name.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategoryConfig>,
    /// Audit events kept in memory; zero disables the audit trail.
    #[serde(default)]
    pub audit_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            sessions: SessionPoolConfig::default(),
            admission: AdmissionConfig::default(),
            watchdog: WatchdogConfig::default(),
            shutdown: ShutdownConfig::default(),
            pacing: PacingConfig::default(),
            categories: default_categories(),
            audit_capacity: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Validate all sections and ensure at least one category exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.executor.max_workers == 0 {
            return Err("executor.max_workers must be greater than 0".into());
        }
        if self.admission.max_windows == 0 {
            return Err("admission.max_windows must be greater than 0".into());
        }
        if self.watchdog.tick_secs == 0 {
            return Err("watchdog.tick_secs must be greater than 0".into());
        }
        if self.shutdown.drain_timeout_secs == 0 {
            return Err("shutdown.drain_timeout_secs must be greater than 0".into());
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err("pacing.min_delay_ms must not exceed max_delay_ms".into());
        }
        if self.pacing.thinking_min_ms > self.pacing.thinking_max_ms {
            return Err("pacing.thinking_min_ms must not exceed thinking_max_ms".into());
        }
        if !(0.0..=1.0).contains(&self.pacing.thinking_chance) {
            return Err("pacing.thinking_chance must be within [0, 1]".into());
        }
        if self.categories.is_empty() {
            return Err("at least one category must be defined".into());
        }
        for (name, category) in &self.categories {
            category
                .validate()
                .map_err(|e| format!("category `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` (if present) and apply `FLEET_*` overrides, then validate.
    ///
    /// Recognised variables: `FLEET_MAX_WORKERS`, `FLEET_MAX_WINDOWS`,
    /// `FLEET_PROFILE_ROOT`, `FLEET_DRAIN_TIMEOUT_SECS`.
    pub fn apply_env_overrides(&mut self) -> Result<(), String> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FLEET_MAX_WORKERS") {
            self.executor.max_workers = parse_var("FLEET_MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("FLEET_MAX_WINDOWS") {
            self.admission.max_windows = parse_var("FLEET_MAX_WINDOWS", &v)?;
        }
        if let Some(v) = lookup("FLEET_PROFILE_ROOT") {
            self.sessions.profile_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("FLEET_DRAIN_TIMEOUT_SECS") {
            self.shutdown.drain_timeout_secs = parse_var("FLEET_DRAIN_TIMEOUT_SECS", &v)?;
        }
        self.validate()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{key}={value:?} is invalid: {e}"))
}
