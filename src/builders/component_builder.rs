//! Builders for the breaker registry and the priority scheduler.

use tracing::info;

use crate::config::{RegistryConfig, SchedulerConfig};
use crate::core::{BreakerRegistry, PriorityScheduler, SchedulerError, SharedEventSink, Spawn};

/// Build a breaker registry and eagerly create a breaker for every service
/// listed in `cfg.services`.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidOptions`] if the configuration is invalid.
pub fn build_registry(cfg: &RegistryConfig) -> Result<BreakerRegistry, SchedulerError> {
    let registry = BreakerRegistry::new(cfg.clone())
        .map_err(|e| SchedulerError::InvalidOptions(format!("config invalid: {e}")))?;
    let mut names: Vec<&String> = cfg.services.keys().collect();
    names.sort();
    for name in names {
        registry.get_breaker(name);
    }
    info!(breakers = registry.names().len(), "breaker registry built");
    Ok(registry)
}

/// Build a scheduler with an in-memory queue and an attached event sink
/// sized by `cfg.event_buffer`.
///
/// The returned sink handle shares its buffer with the scheduler.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidOptions`] if the configuration is invalid.
pub fn build_scheduler<S: Spawn>(
    cfg: &SchedulerConfig,
    spawner: &S,
) -> Result<(PriorityScheduler, SharedEventSink), SchedulerError> {
    let events = SharedEventSink::new(cfg.event_buffer);
    let scheduler = PriorityScheduler::new(cfg.clone(), spawner)?.with_event_sink(events.clone());
    Ok((scheduler, events))
}
