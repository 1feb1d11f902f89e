//! Owning-thread event queue.
//!
//! An [`EventQueue`] is bound to the thread that created it. Any thread may
//! [`post`](EventQueue::post) a task; only the owning thread runs tasks, by
//! calling [`process_events`](EventQueue::process_events). This is the pump a
//! blocked owning thread uses to service work that must run there, such as
//! credential prompts raised by a network exchange running on a worker.
//!
//! ```
//! use ows_bridge_core::EventQueue;
//!
//! let queue = EventQueue::new();
//! let remote = queue.clone();
//! std::thread::spawn(move || remote.post(|| println!("ran on the owner")))
//!     .join()
//!     .unwrap();
//!
//! assert_eq!(queue.process_events().unwrap(), 1);
//! ```

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::error::{CoreError, Result};
use crate::logging::targets;
use crate::thread_check::ThreadAffinity;

type Task = Box<dyn FnOnce() + Send>;

struct QueueInner {
    affinity: ThreadAffinity,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

/// A task queue pumped by a single owning thread.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create a queue owned by the current thread.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            inner: Arc::new(QueueInner {
                affinity: ThreadAffinity::current(),
                sender,
                receiver,
            }),
        }
    }

    /// The owning thread's affinity.
    pub fn affinity(&self) -> ThreadAffinity {
        self.inner.affinity
    }

    /// Check if the current thread owns this queue.
    pub fn is_owner_thread(&self) -> bool {
        self.inner.affinity.is_same_thread()
    }

    /// Post a task to run on the owning thread.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Both channel ends live in `inner`, so the send cannot fail.
        let _ = self.inner.sender.send(Box::new(task));
        tracing::trace!(target: targets::EVENT_QUEUE, pending = self.pending(), "task posted");
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.receiver.len()
    }

    /// Run every task currently queued, in posting order.
    ///
    /// Tasks posted while pumping run in the same call. Returns the number of
    /// tasks executed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WrongThread`] when called off the owning thread.
    pub fn process_events(&self) -> Result<usize> {
        self.check_owner()?;
        let mut executed = 0;
        while let Ok(task) = self.inner.receiver.try_recv() {
            task();
            executed += 1;
        }
        if executed > 0 {
            tracing::debug!(target: targets::EVENT_QUEUE, executed, "processed events");
        }
        Ok(executed)
    }

    /// Block until a task arrives or `timeout` elapses, then pump the queue.
    ///
    /// Returns the number of tasks executed (zero on timeout).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WrongThread`] when called off the owning thread.
    pub fn wait_for_events(&self, timeout: Duration) -> Result<usize> {
        self.check_owner()?;
        match self.inner.receiver.recv_timeout(timeout) {
            Ok(task) => {
                task();
                Ok(1 + self.process_events()?)
            }
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(CoreError::QueueClosed),
        }
    }

    fn check_owner(&self) -> Result<()> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(CoreError::WrongThread {
                expected: self.inner.affinity.thread_id(),
                actual: std::thread::current().id(),
            })
        }
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("owner", &self.inner.affinity.thread_id())
            .field("pending", &self.pending())
            .finish()
    }
}
