//! # Estimate Admission
//!
//! Admission control and fault isolation for estimate, file and AI workloads.
//!
//! The crate has two halves that are usually used together:
//!
//! - [`core::PriorityScheduler`] accepts requests tagged with a priority class,
//!   keeps them ordered by (priority, submission order) and dispatches them one
//!   at a time to registered handlers, retrying failed attempts up to a budget.
//! - [`core::CircuitBreaker`] guards a single downstream dependency. Once the
//!   failure rate inside a sliding window crosses a threshold the breaker
//!   fails fast, then lets probes through after a cooldown to detect recovery.
//!   [`core::BreakerRegistry`] keeps one breaker per named dependency.
//!
//! Handlers typically wrap their outbound calls in a breaker:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use estimate_admission::config::{RegistryConfig, SchedulerConfig};
//! use estimate_admission::core::{
//!     handler_fn, BreakerRegistry, PriorityScheduler, RequestOptions,
//! };
//! use estimate_admission::util::Priority;
//!
//! let registry = Arc::new(BreakerRegistry::new(RegistryConfig::from_env()?)?);
//! let scheduler = PriorityScheduler::on_current_runtime(SchedulerConfig::default())?;
//!
//! let breakers = Arc::clone(&registry);
//! scheduler.register_handler("ai.classify", handler_fn(move |req| {
//!     let breaker = breakers.get_breaker("deepseek");
//!     async move {
//!         let answer = breaker.execute(|| call_model(req.payload)).await?;
//!         Ok(answer)
//!     }
//! }));
//!
//! scheduler.submit("ai.classify", Priority::High, payload, RequestOptions::default())?;
//! ```
//!
//! For complete usage, see the integration tests under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling and fault-isolation abstractions.
pub mod core;
/// Configuration models for the scheduler and circuit breakers.
pub mod config;
/// Builders to construct components from configuration.
pub mod builders;
/// Infrastructure adapters for queue backends.
pub mod infra;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
