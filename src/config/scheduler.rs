//! Priority scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a [`PriorityScheduler`](crate::core::PriorityScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fallback interval at which an idle dispatcher re-checks the queue.
    pub poll_interval_ms: u64,
    /// Retries granted to requests that do not set their own.
    pub default_max_retries: u32,
    /// Largest `max_retries` a request may ask for.
    pub max_retries_ceiling: u32,
    /// Optional bound on pending requests; `None` means unbounded.
    pub max_queue_size: Option<usize>,
    /// Handler timeout applied to requests that do not set their own.
    pub default_timeout_ms: Option<u64>,
    /// Lifecycle events kept by the in-memory event sink.
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            default_max_retries: 3,
            max_retries_ceiling: 100,
            max_queue_size: None,
            default_timeout_ms: None,
            event_buffer: 1024,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle poll interval.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the default retry budget.
    #[must_use]
    pub const fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Bound the number of pending requests.
    #[must_use]
    pub const fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = Some(size);
        self
    }

    /// Set the default handler timeout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Idle poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.default_max_retries > self.max_retries_ceiling {
            return Err(format!(
                "default_max_retries ({}) exceeds max_retries_ceiling ({})",
                self.default_max_retries, self.max_retries_ceiling
            ));
        }
        if self.max_queue_size == Some(0) {
            return Err("max_queue_size must be greater than 0 when set".into());
        }
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
