//! Request handler trait and closure adapter.

use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;

use super::{AppResult, PriorityRequest};

/// Business logic for one request type.
///
/// The scheduler hands each dispatched request to the handler registered
/// for its `type`. Returning an error counts as a failed attempt and is
/// retried while the request has budget left.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use estimate_admission::core::{AppResult, PriorityRequest, RequestHandler};
///
/// struct RecalculateEstimate;
///
/// #[async_trait]
/// impl RequestHandler for RecalculateEstimate {
///     async fn handle(&self, request: PriorityRequest) -> AppResult<serde_json::Value> {
///         let estimate_id = request.payload["estimate_id"].clone();
///         Ok(serde_json::json!({ "recalculated": estimate_id }))
///     }
/// }
/// ```
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Execute the request and return its result.
    async fn handle(&self, request: PriorityRequest) -> AppResult<Value>;
}

/// Adapter that turns an async closure into a [`RequestHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler.
pub const fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(PriorityRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(PriorityRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Value>> + Send + 'static,
{
    async fn handle(&self, request: PriorityRequest) -> AppResult<Value> {
        (self.f)(request).await
    }
}
