//! Core scheduling and fault-isolation abstractions.

pub mod breaker;
pub mod error;
pub mod events;
pub mod handler;
pub mod registry;
pub mod request;
pub mod scheduler;

pub use breaker::{BreakerMetrics, CircuitBreaker, CircuitState};
pub use error::{AppResult, BreakerError, SchedulerError};
pub use events::{
    build_event, EventAction, EventSink, InMemoryEventSink, SchedulerEvent, SharedEventSink,
};
pub use handler::{handler_fn, FnHandler, RequestHandler};
pub use registry::{BreakerRegistry, HealthLevel, RegistryHealth};
pub use request::{
    PriorityBreakdown, PriorityRequest, ProcessingResult, QueueStatistics, RequestOptions,
    RequestStatus,
};
pub use scheduler::{PriorityScheduler, RequestQueue, Spawn};
