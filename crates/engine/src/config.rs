//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Default ceiling on concurrently running units of work.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 64;

/// Shortest poll interval a continuation ever waits.
pub const MIN_POLL_DELAY: Duration = Duration::from_millis(1);

/// How long terminal records stay in the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionPolicy {
    /// `Succeeded` records older than this (by `completed_at`) are reclaimed
    pub succeeded: Duration,
    /// `Failed` records older than this (by `completed_at`) are reclaimed
    pub failed: Duration,
    /// Minimum time between two sweeps
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            succeeded: Duration::from_secs(60 * 60),
            failed: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Polling policy for jobs waiting on a parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContinuationPolicy {
    /// First poll interval
    pub base_delay: Duration,
    /// Growth factor applied per poll
    pub factor: f64,
    /// Poll interval cap
    pub max_delay: Duration,
    /// Hard ceiling on the total wait
    pub timeout: Duration,
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

impl ContinuationPolicy {
    /// Poll interval before poll number `attempt` (0-indexed).
    ///
    /// Never shorter than [`MIN_POLL_DELAY`], even with zero delays configured.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.max(MIN_POLL_DELAY).as_millis() as f64;
        let max_ms = self.max_delay.max(MIN_POLL_DELAY).as_millis() as f64;
        let factor = self.factor.max(1.0);

        let exp = factor.powi(attempt.min(i32::MAX as u32) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineConfig {
    /// Name for logging
    pub name: String,
    /// Maximum concurrently running units (0 = unbounded)
    pub max_concurrent_jobs: usize,
    pub retention: RetentionPolicy,
    pub continuation: ContinuationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "jobforge".to_string(),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            retention: RetentionPolicy::default(),
            continuation: ContinuationPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_continuation(mut self, continuation: ContinuationPolicy) -> Self {
        self.continuation = continuation;
        self
    }

    /// Build from `JOBFORGE_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_var(&lookup, key, default.as_secs()))
        };
        let millis = |key: &str, default: Duration| {
            Duration::from_millis(parse_var(&lookup, key, default.as_millis() as u64))
        };

        Self {
            name: lookup("JOBFORGE_NAME").unwrap_or(defaults.name),
            max_concurrent_jobs: parse_var(
                &lookup,
                "JOBFORGE_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs,
            ),
            retention: RetentionPolicy {
                succeeded: secs(
                    "JOBFORGE_SUCCEEDED_RETENTION_SECS",
                    defaults.retention.succeeded,
                ),
                failed: secs("JOBFORGE_FAILED_RETENTION_SECS", defaults.retention.failed),
                sweep_interval: secs(
                    "JOBFORGE_SWEEP_INTERVAL_SECS",
                    defaults.retention.sweep_interval,
                ),
            },
            continuation: ContinuationPolicy {
                base_delay: millis(
                    "JOBFORGE_CONTINUATION_BASE_DELAY_MS",
                    defaults.continuation.base_delay,
                ),
                factor: parse_var(
                    &lookup,
                    "JOBFORGE_CONTINUATION_BACKOFF_FACTOR",
                    defaults.continuation.factor,
                ),
                max_delay: millis(
                    "JOBFORGE_CONTINUATION_MAX_DELAY_MS",
                    defaults.continuation.max_delay,
                ),
                timeout: secs(
                    "JOBFORGE_CONTINUATION_TIMEOUT_SECS",
                    defaults.continuation.timeout,
                ),
            },
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "invalid configuration value; using default");
                default
            }
        },
    }
}
