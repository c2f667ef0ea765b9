//! API-facing request/response models.
//!
//! Transport-agnostic DTOs and thin helpers that a caller can mount behind
//! HTTP, a message bus, or an in-process command layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{
    BreakerRegistry, HealthLevel, PriorityScheduler, RegistryHealth, RequestOptions, RequestQueue,
    RequestStatus,
};
use crate::util::serde::{Priority, RequestId};

/// Request submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Handler key.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Priority class.
    pub priority: Priority,
    /// Opaque payload handed to the handler.
    #[serde(default)]
    pub data: Value,
    /// Retry budget; the scheduler default applies when absent.
    #[serde(default, rename = "maxRetries", alias = "max_retries")]
    pub max_retries: Option<u32>,
    /// Per-attempt handler timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Priority change payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePriority {
    /// Target request.
    #[serde(rename = "requestId", alias = "request_id")]
    pub request_id: RequestId,
    /// New priority class.
    pub priority: Priority,
}

/// Request status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStatusResponse {
    /// Request identifier.
    pub request_id: RequestId,
    /// Current status.
    pub status: RequestStatus,
    /// Current priority.
    pub priority: Priority,
    /// Attempts made so far.
    pub attempts: u32,
    /// Handler result once completed.
    pub result: Option<Value>,
    /// Last failure message.
    pub error: Option<String>,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// True unless every breaker is open.
    pub ok: bool,
    /// Breaker summary.
    pub breakers: RegistryHealth,
}

/// Submit a request described by a DTO.
///
/// # Errors
///
/// Returns the rendered [`SchedulerError`](crate::core::SchedulerError) when
/// the scheduler rejects the request.
pub fn submit_request<Q: RequestQueue>(
    scheduler: &PriorityScheduler<Q>,
    req: CreateRequest,
) -> Result<RequestStatusResponse, String> {
    let mut options = RequestOptions::new();
    options.max_retries = req.max_retries;
    options.timeout_ms = req.timeout;
    options.metadata = req.metadata;

    let id = scheduler
        .submit(req.request_type, req.priority, req.data, options)
        .map_err(|e| e.to_string())?;
    Ok(RequestStatusResponse {
        request_id: id,
        status: RequestStatus::Pending,
        priority: req.priority,
        attempts: 0,
        result: None,
        error: None,
    })
}

/// Apply a priority change; `false` if the request is no longer pending.
pub fn update_priority<Q: RequestQueue>(
    scheduler: &PriorityScheduler<Q>,
    req: &UpdatePriority,
) -> bool {
    scheduler.update_priority(&req.request_id, req.priority)
}

/// Current status of a request, if known.
pub fn request_status<Q: RequestQueue>(
    scheduler: &PriorityScheduler<Q>,
    request_id: &str,
) -> Option<RequestStatusResponse> {
    scheduler
        .get_request(request_id)
        .map(|r| RequestStatusResponse {
            request_id: r.id,
            status: r.status,
            priority: r.priority,
            attempts: r.attempts,
            result: r.result,
            error: r.error,
        })
}

/// Return a health payload built from the breaker registry.
#[must_use]
pub fn health(registry: &BreakerRegistry) -> Health {
    let breakers = registry.health();
    Health {
        ok: breakers.overall != HealthLevel::Unhealthy,
        breakers,
    }
}
