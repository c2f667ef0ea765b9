//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{
    health, request_status, submit_request, update_priority, CreateRequest, Health,
    RequestStatusResponse, UpdatePriority,
};
pub use tokio_spawner::TokioSpawner;
