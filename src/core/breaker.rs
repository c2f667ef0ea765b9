//! Circuit breaker for isolating calls to one flaky dependency.
//!
//! # States
//!
//! ```text
//! CLOSED ──[volume reached and failure count/rate over threshold]──> OPEN
//!   ▲                                                                 │
//!   │                                                [reset_timeout elapsed,
//!   │                                                  next call probes]
//!   │                                                                 ▼
//!   └──[half_open_requests probes, >= 80% successful]──────── HALF_OPEN
//!                         [any probe failure] ──────────────────────> OPEN
//! ```
//!
//! All state lives behind one `parking_lot::Mutex`. Admission, outcome
//! recording and transitions each happen inside a single short critical
//! section; the lock is never held across an `.await`.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::BreakerConfig;
use crate::core::BreakerError;
use crate::util::clock::now_ms;

/// Success ratio among half-open probes required to close the circuit.
pub const HALF_OPEN_SUCCESS_RATIO: f64 = 0.8;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Failing; calls are rejected without being invoked.
    Open,
    /// Probing; a limited number of calls test recovery.
    HalfOpen,
}

/// Point-in-time breaker metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Calls that were admitted and executed.
    pub total_requests: u64,
    /// Admitted calls that succeeded.
    pub successful_requests: u64,
    /// Failures inside the current monitoring window.
    pub failed_requests: u64,
    /// Admitted calls that failed or timed out, over the breaker lifetime.
    pub total_failures: u64,
    /// Calls rejected without being invoked.
    pub rejected_requests: u64,
    /// Failure percentage inside the current monitoring window.
    pub error_rate: f64,
    /// Current state.
    pub current_state: CircuitState,
    /// Last transition, in milliseconds since epoch.
    pub state_changed_at_ms: u128,
    /// Last recorded failure, in milliseconds since epoch.
    pub last_failure_time_ms: Option<u128>,
    /// Last recorded success, in milliseconds since epoch.
    pub last_success_time_ms: Option<u128>,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: Instant,
    success: bool,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition so permits and outcomes from an earlier
    /// phase cannot touch the current one.
    epoch: u64,
    window: VecDeque<Outcome>,
    next_attempt: Option<Instant>,
    half_open_in_flight: u32,
    probe_successes: u32,
    probe_failures: u32,
    total_requests: u64,
    successful_requests: u64,
    total_failures: u64,
    rejected_requests: u64,
    state_changed_at_ms: u128,
    last_failure_ms: Option<u128>,
    last_success_ms: Option<u128>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            epoch: 0,
            window: VecDeque::new(),
            next_attempt: None,
            half_open_in_flight: 0,
            probe_successes: 0,
            probe_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            total_failures: 0,
            rejected_requests: 0,
            state_changed_at_ms: now_ms(),
            last_failure_ms: None,
            last_success_ms: None,
        }
    }

    fn prune(&mut self, now: Instant, period: Duration) {
        let Some(cutoff) = now.checked_sub(period) else {
            return;
        };
        while self.window.front().is_some_and(|o| o.at <= cutoff) {
            self.window.pop_front();
        }
    }

    fn window_failures(&self) -> usize {
        self.window.iter().filter(|o| !o.success).count()
    }

    #[allow(clippy::cast_precision_loss)]
    fn error_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window_failures() as f64 / self.window.len() as f64 * 100.0
    }
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy)]
enum Admission {
    Pass,
    Probe { epoch: u64 },
}

/// Half-open probe slot, released on drop whatever way the call ends.
struct ProbePermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
}

impl Drop for ProbePermit<'_> {
    fn drop(&mut self) {
        let mut inner = self.breaker.inner.lock();
        if inner.epoch == self.epoch {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Circuit breaker guarding one named dependency.
///
/// Share it with `Arc`; every method takes `&self`.
///
/// # Example
///
/// ```rust,ignore
/// use estimate_admission::config::BreakerConfig;
/// use estimate_admission::core::{BreakerError, CircuitBreaker};
///
/// let breaker = CircuitBreaker::new("deepseek-api", BreakerConfig::default())?;
/// match breaker.execute(|| async { call_provider().await }).await {
///     Ok(reply) => use_reply(reply),
///     Err(e) if e.is_rejection() => use_fallback(),
///     Err(e) => return Err(e.into()),
/// }
/// ```
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker in the CLOSED state.
    ///
    /// # Errors
    ///
    /// Returns the validation message if `config` is invalid.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, String> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| format!("circuit breaker `{name}`: {e}"))?;
        Ok(Self::from_validated(name, config))
    }

    /// Create a breaker from a configuration that already passed `validate`.
    pub(crate) fn from_validated(name: String, config: BreakerConfig) -> Self {
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            volume_threshold = config.volume_threshold,
            reset_timeout_ms = config.reset_timeout_ms,
            timeout_ms = config.timeout_ms,
            "circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Dependency name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this breaker was built with.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Run `operation` through the breaker.
    ///
    /// The operation is raced against the configured timeout; whichever
    /// loses is dropped, so exactly one outcome is recorded per call.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Open`] if the circuit does not admit the call; the
    ///   operation is not invoked.
    /// - [`BreakerError::Timeout`] if the operation exceeds the timeout.
    /// - [`BreakerError::Inner`] with the operation's own error.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let _permit = match admission {
            Admission::Probe { epoch } => Some(ProbePermit {
                breaker: self,
                epoch,
            }),
            Admission::Pass => None,
        };

        let timeout = self.config.timeout();
        match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record(admission, true);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record(admission, false);
                Err(BreakerError::Inner(e))
            }
            Err(_) => {
                warn!(breaker = %self.name, ?timeout, "call timed out");
                self.record(admission, false);
                Err(BreakerError::Timeout {
                    name: self.name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Current state. An OPEN breaker whose reset timeout has elapsed still
    /// reports OPEN until the next call moves it to HALF_OPEN.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call made now would be admitted.
    #[must_use]
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.next_attempt.is_none_or(|at| Instant::now() >= at),
            CircuitState::HalfOpen => inner.half_open_in_flight < self.config.half_open_requests,
        }
    }

    /// Snapshot of counters and state.
    #[must_use]
    pub fn metrics(&self) -> BreakerMetrics {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now(), self.config.monitoring_period());
        BreakerMetrics {
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.window_failures() as u64,
            total_failures: inner.total_failures,
            rejected_requests: inner.rejected_requests,
            error_rate: inner.error_rate(),
            current_state: inner.state,
            state_changed_at_ms: inner.state_changed_at_ms,
            last_failure_time_ms: inner.last_failure_ms,
            last_success_time_ms: inner.last_success_ms,
        }
    }

    /// Force the circuit CLOSED and clear the window and every counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.total_requests = 0;
        inner.successful_requests = 0;
        inner.total_failures = 0;
        inner.rejected_requests = 0;
        inner.last_failure_ms = None;
        inner.last_success_ms = None;
        info!(breaker = %self.name, "circuit breaker manually reset");
    }

    /// Force the circuit OPEN for a full reset timeout. Counters are kept.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
        warn!(breaker = %self.name, "circuit breaker manually opened");
    }

    fn admit<E>(&self) -> Result<Admission, BreakerError<E>> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let due = inner.next_attempt.is_none_or(|at| Instant::now() >= at);
            if !due {
                inner.rejected_requests += 1;
                debug!(breaker = %self.name, "call rejected: circuit open");
                return Err(self.rejection());
            }
            self.transition(&mut inner, CircuitState::HalfOpen);
        }

        match inner.state {
            CircuitState::Closed => Ok(Admission::Pass),
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_requests {
                    inner.rejected_requests += 1;
                    debug!(breaker = %self.name, "call rejected: probe slots exhausted");
                    return Err(self.rejection());
                }
                inner.half_open_in_flight += 1;
                Ok(Admission::Probe { epoch: inner.epoch })
            }
            CircuitState::Open => Err(self.rejection()),
        }
    }

    fn rejection<E>(&self) -> BreakerError<E> {
        BreakerError::Open {
            name: self.name.clone(),
        }
    }

    fn record(&self, admission: Admission, success: bool) {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        inner.total_requests += 1;
        if success {
            inner.successful_requests += 1;
            inner.last_success_ms = Some(now_ms());
        } else {
            inner.total_failures += 1;
            inner.last_failure_ms = Some(now_ms());
        }
        inner.window.push_back(Outcome { at: now, success });
        inner.prune(now, self.config.monitoring_period());

        match (inner.state, admission) {
            (CircuitState::Closed, _) if !success => {
                if self.should_open(&inner) {
                    error!(
                        breaker = %self.name,
                        failures = inner.window_failures(),
                        volume = inner.window.len(),
                        "circuit breaker opened due to failures"
                    );
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, Admission::Probe { epoch }) if epoch == inner.epoch => {
                if success {
                    inner.probe_successes += 1;
                    if self.probes_recovered(&inner) {
                        info!(breaker = %self.name, "circuit breaker recovered");
                        self.transition(&mut inner, CircuitState::Closed);
                    }
                } else {
                    inner.probe_failures += 1;
                    warn!(breaker = %self.name, "probe failed; reopening circuit");
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn should_open(&self, inner: &BreakerState) -> bool {
        let volume = inner.window.len();
        if volume < self.config.volume_threshold as usize {
            return false;
        }
        inner.window_failures() >= self.config.failure_threshold as usize
            || inner.error_rate() >= self.config.error_threshold_percentage
    }

    fn probes_recovered(&self, inner: &BreakerState) -> bool {
        let samples = inner.probe_successes + inner.probe_failures;
        samples >= self.config.half_open_requests
            && f64::from(inner.probe_successes) / f64::from(samples) >= HALF_OPEN_SUCCESS_RATIO
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.epoch += 1;
        inner.state_changed_at_ms = now_ms();
        inner.half_open_in_flight = 0;
        inner.probe_successes = 0;
        inner.probe_failures = 0;
        match to {
            CircuitState::Open => {
                inner.next_attempt = Some(Instant::now() + self.config.reset_timeout());
            }
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                inner.next_attempt = None;
                inner.window.clear();
            }
        }
        info!(breaker = %self.name, ?from, ?to, "circuit breaker transitioned");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
