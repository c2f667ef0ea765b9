//! Infrastructure adapters for request queues.

pub mod queue;
pub use queue::InMemoryQueue;
