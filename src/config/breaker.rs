//! Circuit breaker and registry configuration.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment prefix for the default breaker settings.
pub const ENV_PREFIX: &str = "CB";

/// Comma separated list of dependency names that get their own overrides.
pub const ENV_SERVICES: &str = "CB_SERVICES";

/// Thresholds and timings for a single circuit breaker.
///
/// Durations are stored in milliseconds so the struct round-trips through
/// JSON and environment variables unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures inside the monitoring window that open the circuit.
    pub failure_threshold: u32,
    /// Time spent OPEN before a probe is let through.
    pub reset_timeout_ms: u64,
    /// Length of the trailing outcome window.
    pub monitoring_period_ms: u64,
    /// Concurrent probes allowed while HALF_OPEN, and probes needed to close.
    pub half_open_requests: u32,
    /// Per-call timeout applied by `execute`.
    pub timeout_ms: u64,
    /// Minimum outcomes in the window before the circuit may open.
    pub volume_threshold: u32,
    /// Failure percentage (0-100) inside the window that opens the circuit.
    pub error_threshold_percentage: f64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            monitoring_period_ms: 60_000,
            half_open_requests: 3,
            timeout_ms: 30_000,
            volume_threshold: 10,
            error_threshold_percentage: 50.0,
        }
    }
}

impl BreakerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure count threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays OPEN.
    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the monitoring window length.
    #[must_use]
    pub const fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period_ms = duration_ms(period);
        self
    }

    /// Set the number of half-open probes.
    #[must_use]
    pub const fn with_half_open_requests(mut self, probes: u32) -> Self {
        self.half_open_requests = probes;
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the minimum window volume.
    #[must_use]
    pub const fn with_volume_threshold(mut self, volume: u32) -> Self {
        self.volume_threshold = volume;
        self
    }

    /// Set the error percentage threshold.
    #[must_use]
    pub const fn with_error_threshold_percentage(mut self, percentage: f64) -> Self {
        self.error_threshold_percentage = percentage;
        self
    }

    /// Reset timeout as a `Duration`.
    #[must_use]
    pub const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Monitoring window as a `Duration`.
    #[must_use]
    pub const fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".into());
        }
        if self.reset_timeout_ms == 0 {
            return Err("reset_timeout_ms must be greater than 0".into());
        }
        if self.monitoring_period_ms == 0 {
            return Err("monitoring_period_ms must be greater than 0".into());
        }
        if self.half_open_requests == 0 {
            return Err("half_open_requests must be greater than 0".into());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".into());
        }
        if !(self.error_threshold_percentage > 0.0 && self.error_threshold_percentage <= 100.0) {
            return Err("error_threshold_percentage must be within (0, 100]".into());
        }
        Ok(())
    }

    /// Parse a breaker configuration from JSON and validate it. Missing
    /// fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build the default configuration from `CB_*` environment variables,
    /// loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let cfg = Self::default().overlay(ENV_PREFIX, |key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overwrite fields for which `lookup` returns a value under `prefix`.
    ///
    /// Keys are `{prefix}_FAILURE_THRESHOLD`, `{prefix}_RESET_TIMEOUT`,
    /// `{prefix}_MONITORING_PERIOD`, `{prefix}_HALF_OPEN_REQUESTS`,
    /// `{prefix}_TIMEOUT`, `{prefix}_VOLUME_THRESHOLD` and
    /// `{prefix}_ERROR_THRESHOLD_PERCENTAGE`; durations are milliseconds.
    ///
    /// # Errors
    ///
    /// Returns a message naming the key whose value failed to parse.
    pub fn overlay<F>(mut self, prefix: &str, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            lookup(&key).map(|raw| (key, raw))
        };
        if let Some((key, raw)) = read("FAILURE_THRESHOLD") {
            self.failure_threshold = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("RESET_TIMEOUT") {
            self.reset_timeout_ms = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("MONITORING_PERIOD") {
            self.monitoring_period_ms = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("HALF_OPEN_REQUESTS") {
            self.half_open_requests = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("TIMEOUT") {
            self.timeout_ms = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("VOLUME_THRESHOLD") {
            self.volume_threshold = parse_value(&key, &raw)?;
        }
        if let Some((key, raw)) = read("ERROR_THRESHOLD_PERCENTAGE") {
            self.error_threshold_percentage = parse_value(&key, &raw)?;
        }
        Ok(self)
    }
}

/// Registry-wide breaker configuration: defaults plus per-dependency overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Settings for dependencies without an explicit override.
    pub defaults: BreakerConfig,
    /// Map of dependency name to its dedicated settings.
    pub services: HashMap<String, BreakerConfig>,
}

impl RegistryConfig {
    /// Add or replace the override for one dependency.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.services.insert(name.into(), config);
        self
    }

    /// Settings that apply to `name`.
    #[must_use]
    pub fn for_service(&self, name: &str) -> &BreakerConfig {
        self.services.get(name).unwrap_or(&self.defaults)
    }

    /// Validate defaults and every override.
    ///
    /// # Errors
    ///
    /// Returns the first invalid section with its reason.
    pub fn validate(&self) -> Result<(), String> {
        self.defaults
            .validate()
            .map_err(|e| format!("defaults invalid: {e}"))?;
        for (name, cfg) in &self.services {
            cfg.validate()
                .map_err(|e| format!("service `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse registry configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build from the process environment (after loading `.env`).
    ///
    /// Defaults come from `CB_*`. Every name listed in `CB_SERVICES` gets the
    /// defaults overlaid with `CB_<NAME>_*`, where `<NAME>` is the dependency
    /// name upper-cased with `-` and `.` turned into `_`.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BreakerConfig::default().overlay(ENV_PREFIX, &lookup)?;
        let mut services = HashMap::new();
        if let Some(list) = lookup(ENV_SERVICES) {
            for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                let prefix = format!("{ENV_PREFIX}_{}", env_key(name));
                let cfg = defaults.clone().overlay(&prefix, &lookup)?;
                services.insert(name.to_string(), cfg);
            }
        }
        let cfg = Self { defaults, services };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}"))
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}
