//! Configuration models for the scheduler, breakers, and the breaker registry.

pub mod breaker;
pub mod scheduler;

pub use breaker::{BreakerConfig, RegistryConfig};
pub use scheduler::SchedulerConfig;
