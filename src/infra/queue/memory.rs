//! In-memory ordered queue with priority and FIFO awareness.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use crate::core::{PriorityRequest, RequestQueue};
use crate::util::serde::{Priority, RequestId};

/// Ordering key: highest priority first, then submission order.
type QueueKey = (Reverse<Priority>, u64);

fn key_of(request: &PriorityRequest) -> QueueKey {
    (Reverse(request.priority), request.sequence)
}

/// In-memory queue storing pending requests in a totally ordered map.
///
/// A `BTreeMap` keyed by `(priority desc, sequence asc)` gives O(log n)
/// enqueue/dequeue, and a side index by id makes cancel and re-prioritise
/// O(log n) as well.
#[derive(Default)]
pub struct InMemoryQueue {
    entries: BTreeMap<QueueKey, PriorityRequest>,
    index: HashMap<RequestId, QueueKey>,
}

impl InMemoryQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestQueue for InMemoryQueue {
    fn enqueue(&mut self, request: PriorityRequest) {
        let key = key_of(&request);
        if let Some(stale) = self.index.insert(request.id.clone(), key) {
            self.entries.remove(&stale);
        }
        self.entries.insert(key, request);
    }

    fn dequeue(&mut self) -> Option<PriorityRequest> {
        let (_, request) = self.entries.pop_first()?;
        self.index.remove(&request.id);
        Some(request)
    }

    fn remove(&mut self, id: &str) -> Option<PriorityRequest> {
        let key = self.index.remove(id)?;
        self.entries.remove(&key)
    }

    fn reprioritize(&mut self, id: &str, priority: Priority) -> Option<Priority> {
        let mut request = self.remove(id)?;
        let old = request.priority;
        request.priority = priority;
        self.enqueue(request);
        Some(old)
    }

    fn get(&self, id: &str) -> Option<&PriorityRequest> {
        self.index.get(id).and_then(|key| self.entries.get(key))
    }

    fn snapshot(&self, filter: Option<Priority>) -> Vec<PriorityRequest> {
        self.entries
            .values()
            .filter(|r| filter.is_none_or(|p| r.priority == p))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
