//! Request model owned by the priority scheduler.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::serde::{Priority, RequestId};

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting in the queue.
    Pending,
    /// Handed to a handler.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Terminally failed (no handler, or retries exhausted).
    Failed,
    /// Removed from the queue before dispatch.
    Cancelled,
}

impl RequestStatus {
    /// Terminal statuses never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Optional per-request settings passed to `submit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestOptions {
    /// Retries after the first attempt; the scheduler default applies when unset.
    pub max_retries: Option<u32>,
    /// Per-attempt handler timeout; the scheduler default applies when unset.
    pub timeout_ms: Option<u64>,
    /// Free-form caller metadata, carried through to the handler.
    pub metadata: HashMap<String, Value>,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the handler timeout.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A unit of work tracked by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityRequest {
    /// Identifier generated on submission.
    pub id: RequestId,
    /// Handler key.
    #[serde(rename = "type")]
    pub request_type: String,
    /// Priority class.
    pub priority: Priority,
    /// Opaque data passed to the handler.
    pub payload: Value,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Handler executions started so far.
    pub attempts: u32,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Per-attempt handler timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Caller metadata.
    pub metadata: HashMap<String, Value>,
    /// Submission time in milliseconds since epoch.
    pub created_at_ms: u128,
    /// Handler output once completed.
    pub result: Option<Value>,
    /// Last failure message.
    pub error: Option<String>,
    /// Duration of the last attempt in milliseconds.
    pub processing_time_ms: Option<u64>,
    /// Submission order; breaks ties between equal timestamps.
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl PriorityRequest {
    /// Handler timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Executions allowed in total (`max_retries + 1`).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Outcome of a single execution, returned by `process_immediate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Whether the handler succeeded.
    pub success: bool,
    /// Handler output on success.
    pub data: Option<Value>,
    /// Failure message otherwise.
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub processing_time_ms: u64,
}

/// Number of submissions per priority class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    /// HIGH submissions.
    pub high: u64,
    /// MEDIUM submissions.
    pub medium: u64,
    /// LOW submissions.
    pub low: u64,
}

impl PriorityBreakdown {
    pub(crate) fn bump(&mut self, priority: Priority) {
        match priority {
            Priority::High => self.high += 1,
            Priority::Medium => self.medium += 1,
            Priority::Low => self.low += 1,
        }
    }

    /// Count for one class.
    #[must_use]
    pub const fn get(&self, priority: Priority) -> u64 {
        match priority {
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Scheduler statistics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatistics {
    /// Requests accepted by `submit`.
    pub total_requests: u64,
    /// Requests that reached `completed` or `failed`.
    pub processed_requests: u64,
    /// Requests that reached `failed`.
    pub failed_requests: u64,
    /// Requests cancelled while pending.
    pub cancelled_requests: u64,
    /// Failed attempts that were put back in the queue.
    pub retried_attempts: u64,
    /// Running mean over successful executions, in milliseconds.
    pub average_processing_time_ms: f64,
    /// Requests currently pending.
    pub queue_length: usize,
    /// Submissions per priority class.
    pub priority_breakdown: PriorityBreakdown,
}
