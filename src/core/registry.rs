//! Registry holding one circuit breaker per named dependency.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BreakerConfig, RegistryConfig};
use crate::core::breaker::{BreakerMetrics, CircuitBreaker, CircuitState};

/// Aggregate health across registered breakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    /// No breaker is open or probing.
    Healthy,
    /// Some breakers are open or probing, but not all are open.
    Degraded,
    /// Every registered breaker is open.
    Unhealthy,
}

/// Health summary returned by [`BreakerRegistry::health`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryHealth {
    /// Registered breakers.
    pub total_breakers: usize,
    /// Breakers currently OPEN.
    pub open_breakers: usize,
    /// Breakers currently HALF_OPEN.
    pub half_open_breakers: usize,
    /// Whether any breaker is OPEN.
    pub has_open_breakers: bool,
    /// Overall verdict.
    pub overall: HealthLevel,
}

/// Process-scoped map from dependency name to its breaker.
///
/// Breakers are created lazily on first lookup and live as long as the
/// registry; the same name always resolves to the same instance. Pass the
/// registry (usually in an `Arc`) to whoever makes outbound calls.
pub struct BreakerRegistry {
    config: RegistryConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// Returns the validation message if the defaults or any service
    /// override is invalid.
    pub fn new(config: RegistryConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: RegistryConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Breaker for `name`, created from the service override or the defaults.
    pub fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        let config = self.config.for_service(name).clone();
        self.get_or_insert(name, config)
    }

    /// Breaker for `name`, created with `config` if it does not exist yet.
    ///
    /// An existing breaker is returned unchanged; the first configuration wins.
    ///
    /// # Errors
    ///
    /// Returns the validation message if `config` is invalid; nothing is
    /// registered in that case.
    pub fn get_breaker_with(
        &self,
        name: &str,
        config: BreakerConfig,
    ) -> Result<Arc<CircuitBreaker>, String> {
        config
            .validate()
            .map_err(|e| format!("circuit breaker `{name}`: {e}"))?;
        Ok(self.get_or_insert(name, config))
    }

    // `config` must already be valid.
    fn get_or_insert(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return Arc::clone(existing);
        }
        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            info!(breaker = %name, "registered circuit breaker");
            Arc::new(CircuitBreaker::from_validated(name.to_string(), config))
        });
        Arc::clone(breaker)
    }

    /// Existing breaker for `name`, without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Registered dependency names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Metrics for every registered breaker, keyed by name.
    #[must_use]
    pub fn all_metrics(&self) -> BTreeMap<String, BreakerMetrics> {
        self.snapshot()
            .into_iter()
            .map(|(name, breaker)| (name, breaker.metrics()))
            .collect()
    }

    /// Reset every registered breaker.
    pub fn reset_all(&self) {
        for (name, breaker) in self.snapshot() {
            breaker.reset();
            info!(breaker = %name, "reset circuit breaker");
        }
    }

    /// Summarize breaker states.
    #[must_use]
    pub fn health(&self) -> RegistryHealth {
        let states: Vec<CircuitState> = self
            .snapshot()
            .into_iter()
            .map(|(_, breaker)| breaker.state())
            .collect();
        let total = states.len();
        let open = states.iter().filter(|s| **s == CircuitState::Open).count();
        let half_open = states
            .iter()
            .filter(|s| **s == CircuitState::HalfOpen)
            .count();

        let overall = if open == 0 {
            if half_open > 0 {
                HealthLevel::Degraded
            } else {
                HealthLevel::Healthy
            }
        } else if open < total {
            HealthLevel::Degraded
        } else {
            HealthLevel::Unhealthy
        };

        RegistryHealth {
            total_breakers: total,
            open_breakers: open,
            half_open_breakers: half_open,
            has_open_breakers: open > 0,
            overall,
        }
    }

    /// Configuration the registry resolves new breakers from.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // Clone the handles out so breaker locks are never taken under the map lock.
    fn snapshot(&self) -> Vec<(String, Arc<CircuitBreaker>)> {
        self.breakers
            .read()
            .iter()
            .map(|(name, breaker)| (name.clone(), Arc::clone(breaker)))
            .collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::with_validated(RegistryConfig::default())
    }
}
