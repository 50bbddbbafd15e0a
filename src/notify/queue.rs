//! Cross-thread coalescing work queue
//!
//! Producers on any thread post zero-argument tasks through a
//! [`QueueSender`]; the thread that created the [`NotificationQueue`] runs
//! them with [`NotificationQueue::exec`]. Tasks posted under a
//! [`Tag::Coalesce`] tag share one slot: a newer task replaces the pending
//! one, which is dropped without running.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use thiserror::Error;

/// Queue tag controlling coalescing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Always appended, never replaced
    Unique,
    /// At most one pending entry per value; later enqueues replace it
    Coalesce(u32),
}

/// Errors from the notification queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// `exec` was called off the owner thread
    #[error("notification queue drained from {current:?}, owner is {owner:?}")]
    WrongThread { owner: ThreadId, current: ThreadId },
}

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueEntry {
    task: Task,
    tag: Tag,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<VecDeque<QueueEntry>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, task: Task, tag: Tag) {
        let mut entries = self.lock();
        if let Tag::Coalesce(_) = tag {
            if let Some(pending) = entries.iter_mut().find(|e| e.tag == tag) {
                pending.task = task;
                return;
            }
        }
        entries.push_back(QueueEntry { task, tag });
    }
}

/// Producer handle; cheap to clone and safe to send to worker threads
#[derive(Clone)]
pub struct QueueSender {
    shared: Arc<Shared>,
}

impl QueueSender {
    /// Post `task` under `tag`
    pub fn enqueue<F>(&self, task: F, tag: Tag)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue(Box::new(task), tag);
    }
}

impl fmt::Debug for QueueSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("pending", &self.shared.lock().len())
            .finish()
    }
}

/// Owner side of the queue, bound to the thread that created it
pub struct NotificationQueue {
    shared: Arc<Shared>,
    owner: ThreadId,
}

impl NotificationQueue {
    /// Create a queue owned by the current thread
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            owner: thread::current().id(),
        }
    }

    /// Producer handle for other threads
    pub fn sender(&self) -> QueueSender {
        QueueSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Post `task` under `tag` from the owner thread
    pub fn enqueue<F>(&self, task: F, tag: Tag)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.enqueue(Box::new(task), tag);
    }

    /// Run every queued task in arrival order; returns how many ran
    ///
    /// Tasks enqueued while draining wait for the next call.
    pub fn exec(&self) -> Result<usize, QueueError> {
        let current = thread::current().id();
        if current != self.owner {
            return Err(QueueError::WrongThread {
                owner: self.owner,
                current,
            });
        }

        let drained = std::mem::take(&mut *self.shared.lock());
        let count = drained.len();
        for entry in drained {
            (entry.task)();
        }
        Ok(count)
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Thread allowed to drain
    pub fn owner(&self) -> ThreadId {
        self.owner
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("owner", &self.owner)
            .field("pending", &self.len())
            .finish()
    }
}
