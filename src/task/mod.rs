//! Background task envelopes and the queues they are pushed to.
//!
//! Tasks are serialized as JSON and pushed onto `queue:<name>`, newest first,
//! for an external worker pool to consume.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Key prefix for queue lists.
pub const QUEUE_PREFIX: &str = "queue:";

/// Worker class for exchange audit records.
pub const AUDIT_WORKER: &str = "AuditWorker";

/// Per-queue bound of a `MemoryQueue` built with `new()`.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to serialize task: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A job envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "class")]
    pub worker_class: String,
    pub queue: String,
    pub args: serde_json::Value,
    pub retry: bool,
    pub jid: String,
    /// Unix nanoseconds.
    pub created_at: i64,
    /// Unix nanoseconds.
    pub enqueued_at: i64,
}

impl Task {
    pub fn new(worker_class: impl Into<String>, args: serde_json::Value, jid: impl Into<String>) -> Self {
        Self {
            worker_class: worker_class.into(),
            queue: String::new(),
            args,
            retry: false,
            jid: jid.into(),
            created_at: 0,
            enqueued_at: 0,
        }
    }

    /// Stamp the task for `queue` and push it.
    pub async fn perform(mut self, queue: &str, backend: &dyn TaskQueue) -> Result<(), QueueError> {
        let now = unix_nanos();
        self.created_at = now;
        self.enqueued_at = now;
        self.queue = queue.to_string();

        let payload = serde_json::to_vec(&self)?;
        backend.enqueue(queue, payload).await
    }
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// A list-style queue store.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Push a serialized task to the front of `queue:<queue>`.
    async fn enqueue(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError>;
}

/// In-process queue store.
///
/// Each queue holds at most `capacity` payloads; pushing onto a full queue
/// drops the oldest one.
#[derive(Debug)]
pub struct MemoryQueue {
    lists: DashMap<String, VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lists: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remove the oldest payload of a queue.
    pub fn pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.lists.get_mut(&key(queue))?.pop_back()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.lists.get(&key(queue)).map_or(0, |list| list.len())
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, queue: &str, payload: Vec<u8>) -> Result<(), QueueError> {
        let mut list = self.lists.entry(key(queue)).or_default();
        list.push_front(payload);

        let mut dropped = 0;
        while list.len() > self.capacity {
            list.pop_back();
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(queue, dropped, capacity = self.capacity, "Queue full, oldest tasks dropped");
        }
        Ok(())
    }
}

fn key(queue: &str) -> String {
    format!("{}{}", QUEUE_PREFIX, queue)
}
