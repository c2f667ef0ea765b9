//! Priority scheduler: ordered queue, single dispatcher, bounded retries.
//!
//! Requests are dispatched strictly by (priority desc, submission order).
//! Lower classes can starve while higher classes keep arriving; there is no
//! aging.

use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::events::{build_event, EventAction, EventSink};
use crate::core::{
    PriorityBreakdown, PriorityRequest, ProcessingResult, QueueStatistics, RequestHandler,
    RequestOptions, RequestStatus, SchedulerError,
};
use crate::infra::queue::InMemoryQueue;
use crate::runtime::TokioSpawner;
use crate::util::clock::now_ms;
use crate::util::serde::{new_request_id, Priority, RequestId};

/// Abstraction for ordered queue backends.
///
/// Implementations must keep requests ordered by priority (highest first)
/// and, within a priority, by `sequence` (lowest first).
pub trait RequestQueue: Send + 'static {
    /// Insert a pending request at its ordered position.
    fn enqueue(&mut self, request: PriorityRequest);
    /// Remove and return the head of the queue.
    fn dequeue(&mut self) -> Option<PriorityRequest>;
    /// Remove a specific request.
    fn remove(&mut self, id: &str) -> Option<PriorityRequest>;
    /// Move a pending request to another class; returns the old class.
    fn reprioritize(&mut self, id: &str, priority: Priority) -> Option<Priority>;
    /// Look up a pending request.
    fn get(&self, id: &str) -> Option<&PriorityRequest>;
    /// Ordered copy of pending requests, optionally for one class only.
    fn snapshot(&self, filter: Option<Priority>) -> Vec<PriorityRequest>;
    /// Current depth.
    fn len(&self) -> usize;
    /// Whether nothing is pending.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Abstraction for spawning the dispatch loop on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

#[derive(Default)]
struct StatsState {
    total: u64,
    processed: u64,
    failed: u64,
    cancelled: u64,
    retried: u64,
    completed: u64,
    average_ms: f64,
    breakdown: PriorityBreakdown,
}

impl StatsState {
    #[allow(clippy::cast_precision_loss)]
    fn record_success(&mut self, elapsed_ms: u64) {
        self.processed += 1;
        self.completed += 1;
        self.average_ms += (elapsed_ms as f64 - self.average_ms) / self.completed as f64;
    }

    fn record_failure(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }
}

/// State shared between the public handle and the dispatch loop.
struct Shared<Q> {
    config: SchedulerConfig,
    queue: Mutex<Q>,
    handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    /// Requests that have left the queue (in flight or terminal).
    records: Mutex<HashMap<RequestId, PriorityRequest>>,
    stats: Mutex<StatsState>,
    events: Mutex<Option<Box<dyn EventSink>>>,
    wake: Notify,
    shutdown: AtomicBool,
    sequence: AtomicU64,
}

impl<Q: RequestQueue> Shared<Q> {
    fn emit(&self, request: &PriorityRequest, action: EventAction, detail: Option<String>) {
        if let Some(sink) = self.events.lock().as_mut() {
            sink.record(build_event(request, action, detail));
        }
    }

    fn store(&self, request: PriorityRequest) {
        self.records.lock().insert(request.id.clone(), request);
    }

    /// Record a request just taken out of the queue as in flight.
    ///
    /// Callers hold the queue lock so the request is always visible in
    /// either the queue or the records.
    fn claim(&self, request: PriorityRequest) -> PriorityRequest {
        let mut in_flight = request.clone();
        in_flight.status = RequestStatus::Processing;
        self.store(in_flight);
        request
    }

    fn take_next(&self) -> Option<PriorityRequest> {
        let mut queue = self.queue.lock();
        queue.dequeue().map(|request| self.claim(request))
    }

    fn take(&self, request_id: &str) -> Option<PriorityRequest> {
        let mut queue = self.queue.lock();
        queue.remove(request_id).map(|request| self.claim(request))
    }

    async fn process(&self, mut request: PriorityRequest) -> ProcessingResult {
        let handler = self.handlers.read().get(&request.request_type).cloned();
        let Some(handler) = handler else {
            let err = SchedulerError::NoHandler(request.request_type.clone());
            let message = err.to_string();
            error!(request_id = %request.id, "{message}");
            request.status = RequestStatus::Failed;
            request.error = Some(message.clone());
            self.stats.lock().record_failure();
            self.emit(&request, EventAction::Failed, Some(message.clone()));
            self.store(request);
            return ProcessingResult {
                success: false,
                data: None,
                error: Some(message),
                processing_time_ms: 0,
            };
        };

        request.status = RequestStatus::Processing;
        request.attempts += 1;
        debug!(
            request_id = %request.id,
            attempt = request.attempts,
            max_attempts = request.max_attempts(),
            "processing request"
        );
        self.emit(&request, EventAction::Processing, None);
        self.store(request.clone());

        let started = Instant::now();
        let outcome = run_handler(handler.as_ref(), request.clone()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        request.processing_time_ms = Some(elapsed_ms);

        match outcome {
            Ok(value) => {
                request.status = RequestStatus::Completed;
                request.result = Some(value.clone());
                request.error = None;
                self.stats.lock().record_success(elapsed_ms);
                info!(request_id = %request.id, elapsed_ms, "request completed");
                self.emit(&request, EventAction::Completed, None);
                self.store(request);
                ProcessingResult {
                    success: true,
                    data: Some(value),
                    error: None,
                    processing_time_ms: elapsed_ms,
                }
            }
            Err(err) => {
                let message = err.to_string();
                request.error = Some(message.clone());
                if err.is_retryable() && request.attempts <= request.max_retries {
                    warn!(
                        request_id = %request.id,
                        attempt = request.attempts,
                        error = %message,
                        "request failed; requeueing"
                    );
                    request.status = RequestStatus::Pending;
                    self.stats.lock().retried += 1;
                    self.emit(&request, EventAction::Retrying, Some(message.clone()));
                    let mut queue = self.queue.lock();
                    self.records.lock().remove(&request.id);
                    queue.enqueue(request);
                    drop(queue);
                    self.wake.notify_one();
                } else {
                    error!(
                        request_id = %request.id,
                        attempts = request.attempts,
                        error = %message,
                        "request failed permanently"
                    );
                    request.status = RequestStatus::Failed;
                    self.stats.lock().record_failure();
                    self.emit(&request, EventAction::Failed, Some(message.clone()));
                    self.store(request);
                }
                ProcessingResult {
                    success: false,
                    data: None,
                    error: Some(message),
                    processing_time_ms: elapsed_ms,
                }
            }
        }
    }
}

async fn run_handler(
    handler: &dyn RequestHandler,
    request: PriorityRequest,
) -> Result<Value, SchedulerError> {
    let limit = request.timeout();
    let fut = AssertUnwindSafe(handler.handle(request)).catch_unwind();
    let caught = match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SchedulerError::HandlerTimeout(limit))?,
        None => fut.await,
    };
    let result = caught.map_err(|panic| {
        SchedulerError::Handler(format!("handler panicked: {}", panic_message(&*panic)))
    })?;
    result.map_err(|e| SchedulerError::Handler(format!("{e:#}")))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

async fn dispatch_loop<Q: RequestQueue>(shared: Arc<Shared<Q>>) {
    let poll = shared.config.poll_interval();
    debug!(?poll, "dispatch loop started");
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match shared.take_next() {
            Some(request) => {
                shared.process(request).await;
            }
            None => {
                tokio::select! {
                    () = shared.wake.notified() => {}
                    () = tokio::time::sleep(poll) => {}
                }
            }
        }
    }
    info!("dispatch loop stopped");
}

/// Priority-ordered work scheduler with a single background dispatcher.
///
/// `submit` never waits on the dispatcher. The dispatcher executes one
/// request at a time and retries failed handlers until `max_retries` is
/// used up. Dropping the scheduler stops the dispatcher after its current
/// request.
///
/// # Example
///
/// ```rust,ignore
/// use estimate_admission::config::SchedulerConfig;
/// use estimate_admission::core::{handler_fn, PriorityScheduler, RequestOptions};
/// use estimate_admission::util::Priority;
///
/// let scheduler = PriorityScheduler::on_current_runtime(SchedulerConfig::default())?;
/// scheduler.register_handler("estimate.recalculate", handler_fn(|req| async move {
///     Ok(serde_json::json!({ "id": req.id }))
/// }));
/// let id = scheduler.submit(
///     "estimate.recalculate",
///     Priority::High,
///     serde_json::json!({ "estimate_id": 42 }),
///     RequestOptions::default(),
/// )?;
/// ```
pub struct PriorityScheduler<Q: RequestQueue = InMemoryQueue> {
    shared: Arc<Shared<Q>>,
}

impl PriorityScheduler<InMemoryQueue> {
    /// Create a scheduler backed by an [`InMemoryQueue`] and start its
    /// dispatcher on `spawner`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidOptions`] if `config` is invalid.
    pub fn new<S: Spawn>(config: SchedulerConfig, spawner: &S) -> Result<Self, SchedulerError> {
        Self::with_queue(config, InMemoryQueue::new(), spawner)
    }

    /// Create a scheduler on the Tokio runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Runtime`] outside a Tokio runtime, or
    /// [`SchedulerError::InvalidOptions`] if `config` is invalid.
    pub fn on_current_runtime(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let spawner = TokioSpawner::try_current()?;
        Self::new(config, &spawner)
    }
}

impl<Q: RequestQueue> PriorityScheduler<Q> {
    /// Create a scheduler over a custom queue backend.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidOptions`] if `config` is invalid.
    pub fn with_queue<S: Spawn>(
        config: SchedulerConfig,
        queue: Q,
        spawner: &S,
    ) -> Result<Self, SchedulerError> {
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidOptions(format!("config invalid: {e}")))?;

        let shared = Arc::new(Shared {
            config,
            queue: Mutex::new(queue),
            handlers: RwLock::new(HashMap::new()),
            records: Mutex::new(HashMap::new()),
            stats: Mutex::new(StatsState::default()),
            events: Mutex::new(None),
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
        });
        spawner.spawn(dispatch_loop(Arc::clone(&shared)));
        info!("priority scheduler started");
        Ok(Self { shared })
    }

    /// Attach a lifecycle event sink.
    #[must_use]
    pub fn with_event_sink(self, sink: impl EventSink + 'static) -> Self {
        *self.shared.events.lock() = Some(Box::new(sink));
        self
    }

    /// Register the handler for `request_type`, replacing any earlier one.
    pub fn register_handler<H: RequestHandler>(&self, request_type: impl Into<String>, handler: H) {
        let request_type = request_type.into();
        let replaced = self
            .shared
            .handlers
            .write()
            .insert(request_type.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            warn!(request_type = %request_type, "handler replaced");
        } else {
            info!(request_type = %request_type, "handler registered");
        }
        self.shared.wake.notify_one();
    }

    /// Enqueue a new request and return its id. Never waits for dispatch.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::InvalidOptions`] for an empty type, a retry budget
    ///   above the configured ceiling, or a zero timeout.
    /// - [`SchedulerError::QueueFull`] when `max_queue_size` is set and reached.
    pub fn submit(
        &self,
        request_type: impl Into<String>,
        priority: Priority,
        payload: Value,
        options: RequestOptions,
    ) -> Result<RequestId, SchedulerError> {
        let request_type = request_type.into();
        let config = &self.shared.config;

        if request_type.trim().is_empty() {
            return Err(SchedulerError::InvalidOptions(
                "request type must not be empty".into(),
            ));
        }
        let max_retries = options.max_retries.unwrap_or(config.default_max_retries);
        if max_retries > config.max_retries_ceiling {
            return Err(SchedulerError::InvalidOptions(format!(
                "max_retries {max_retries} exceeds ceiling {}",
                config.max_retries_ceiling
            )));
        }
        if options.timeout_ms == Some(0) {
            return Err(SchedulerError::InvalidOptions(
                "timeout must be greater than 0".into(),
            ));
        }

        let request = PriorityRequest {
            id: new_request_id(),
            request_type,
            priority,
            payload,
            status: RequestStatus::Pending,
            attempts: 0,
            max_retries,
            timeout_ms: options.timeout_ms.or(config.default_timeout_ms),
            metadata: options.metadata,
            created_at_ms: now_ms(),
            result: None,
            error: None,
            processing_time_ms: None,
            sequence: self.shared.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let id = request.id.clone();

        {
            let mut queue = self.shared.queue.lock();
            if let Some(limit) = config.max_queue_size {
                if queue.len() >= limit {
                    warn!(request_id = %id, depth = queue.len(), "request rejected: queue full");
                    return Err(SchedulerError::QueueFull(format!(
                        "max queue size {limit} reached"
                    )));
                }
            }
            self.shared.emit(&request, EventAction::Added, None);
            queue.enqueue(request);
        }
        {
            let mut stats = self.shared.stats.lock();
            stats.total += 1;
            stats.breakdown.bump(priority);
        }

        info!(request_id = %id, %priority, "request added");
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Move a pending request to another priority class.
    ///
    /// Returns `false` if the request is not pending (unknown, dispatched,
    /// or finished).
    pub fn update_priority(&self, request_id: &str, priority: Priority) -> bool {
        let mut queue = self.shared.queue.lock();
        let Some(old) = queue.reprioritize(request_id, priority) else {
            return false;
        };
        if let Some(request) = queue.get(request_id) {
            self.shared.emit(
                request,
                EventAction::PriorityChanged,
                Some(format!("{old} -> {priority}")),
            );
        }
        drop(queue);
        info!(request_id, %old, new = %priority, "request priority updated");
        self.shared.wake.notify_one();
        true
    }

    /// Cancel a pending request.
    ///
    /// Returns `false` if it was already dispatched or is unknown. Running
    /// handlers are never interrupted.
    pub fn cancel(&self, request_id: &str) -> bool {
        let mut queue = self.shared.queue.lock();
        let Some(mut request) = queue.remove(request_id) else {
            return false;
        };
        request.status = RequestStatus::Cancelled;
        self.shared.store(request.clone());
        drop(queue);
        self.shared.stats.lock().cancelled += 1;
        self.shared.emit(&request, EventAction::Cancelled, None);
        info!(request_id, "request cancelled");
        true
    }

    /// Take a pending request out of the queue and run it now, in the
    /// caller's task, regardless of its position.
    ///
    /// Returns `None` if the request is not pending. A failed attempt with
    /// retries left goes back to the queue as usual.
    pub async fn process_immediate(&self, request_id: &str) -> Option<ProcessingResult> {
        let request = self.shared.take(request_id)?;
        info!(request_id, "processing request immediately");
        Some(self.shared.process(request).await)
    }

    /// Ordered snapshot of pending requests, optionally for one class.
    #[must_use]
    pub fn get_pending(&self, priority: Option<Priority>) -> Vec<PriorityRequest> {
        self.shared.queue.lock().snapshot(priority)
    }

    /// Current view of a request in any state.
    #[must_use]
    pub fn get_request(&self, request_id: &str) -> Option<PriorityRequest> {
        // Queue before records, the same order every transition takes them in.
        let queue = self.shared.queue.lock();
        if let Some(pending) = queue.get(request_id) {
            return Some(pending.clone());
        }
        self.shared.records.lock().get(request_id).cloned()
    }

    /// Scheduler statistics.
    #[must_use]
    pub fn get_statistics(&self) -> QueueStatistics {
        let queue_length = self.shared.queue.lock().len();
        let stats = self.shared.stats.lock();
        QueueStatistics {
            total_requests: stats.total,
            processed_requests: stats.processed,
            failed_requests: stats.failed,
            cancelled_requests: stats.cancelled,
            retried_attempts: stats.retried,
            average_processing_time_ms: stats.average_ms,
            queue_length,
            priority_breakdown: stats.breakdown,
        }
    }

    /// Idle poll interval of the dispatcher.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.shared.config.poll_interval()
    }

    /// Stop the dispatcher once its current request finishes. Pending
    /// requests stay queued.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            info!("shutting down priority scheduler");
            self.shared.wake.notify_one();
        }
    }
}

impl<Q: RequestQueue> Drop for PriorityScheduler<Q> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
