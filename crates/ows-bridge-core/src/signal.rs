//! Signal/slot notifications for ows-bridge.
//!
//! A [`Signal<Args>`] is an observer list. Slots are invoked in connection
//! order each time the signal is emitted. Two delivery modes exist:
//!
//! - **Direct**: the slot runs on the emitting thread, before `emit` returns.
//! - **Queued**: the slot is posted to an [`EventQueue`] and runs when the
//!   queue's owning thread pumps it with [`EventQueue::process_events`].
//!
//! Request clients use direct slots for their progress and completion
//! signals, so the delivery order seen by a slot is the emission order:
//! every progress notification of an exchange precedes its single
//! completion notification.
//!
//! # Example
//!
//! ```
//! use ows_bridge_core::Signal;
//!
//! let progress = Signal::<u64>::new();
//!
//! let conn_id = progress.connect(|bytes| {
//!     println!("{bytes} bytes received");
//! });
//!
//! progress.emit(1024);
//! progress.disconnect(conn_id);
//! ```

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::event_queue::EventQueue;
use crate::logging::targets;

new_key_type! {
    /// Identifies one signal-slot connection.
    ///
    /// Returned by [`Signal::connect`] and accepted by [`Signal::disconnect`].
    pub struct ConnectionId;
}

/// How a connected slot is invoked when the signal is emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke the slot on the emitting thread.
    #[default]
    Direct,
    /// Post the slot to an event queue and run it when that queue is pumped.
    Queued,
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connection<Args> {
    slot: Slot<Args>,
    /// Target queue for queued connections.
    queue: Option<EventQueue>,
}

impl<Args> Connection<Args> {
    fn connection_type(&self) -> ConnectionType {
        if self.queue.is_some() {
            ConnectionType::Queued
        } else {
            ConnectionType::Direct
        }
    }
}

/// A type-safe signal that can have multiple connected slots.
///
/// `Signal<Args>` is `Send + Sync`; emission from any thread is allowed.
/// Slots are collected under the connection lock and invoked after it is
/// released, so a slot may connect or disconnect slots on the same signal.
pub struct Signal<Args> {
    connections: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot that runs directly on the emitting thread.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Connection {
            slot: Arc::new(slot),
            queue: None,
        })
    }

    /// Connect a slot that runs on `queue`'s owning thread.
    ///
    /// Each emission clones the arguments into a task posted to `queue`.
    /// The slot runs the next time that thread calls
    /// [`EventQueue::process_events`].
    pub fn connect_queued<F>(&self, queue: &EventQueue, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Connection {
            slot: Arc::new(slot),
            queue: Some(queue.clone()),
        })
    }

    /// Get how a connection delivers, or `None` if the id is unknown.
    pub fn connection_type(&self, id: ConnectionId) -> Option<ConnectionType> {
        self.connections.lock().get(id).map(Connection::connection_type)
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Emit the signal, invoking all connected slots in connection order.
    pub fn emit(&self, args: Args) {
        let snapshot: Vec<(Slot<Args>, Option<EventQueue>)> = self
            .connections
            .lock()
            .values()
            .map(|conn| (conn.slot.clone(), conn.queue.clone()))
            .collect();
        tracing::trace!(
            target: targets::SIGNAL,
            connection_count = snapshot.len(),
            "emitting signal"
        );

        for (slot, queue) in snapshot {
            match queue {
                None => slot(&args),
                Some(queue) => {
                    let args = args.clone();
                    queue.post(move || slot(&args));
                }
            }
        }
    }
}

/// RAII connection that disconnects when dropped.
///
/// The guard holds a weak reference, so dropping it after the signal is gone
/// is harmless.
///
/// # Example
///
/// ```
/// use ows_bridge_core::Signal;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// let signal = Arc::new(Signal::<u64>::new());
/// let total = Arc::new(AtomicU64::new(0));
/// {
///     let total = total.clone();
///     let _guard = signal.connect_scoped(move |&n| {
///         total.fetch_add(n, Ordering::SeqCst);
///     });
///     signal.emit(42);
/// }
/// signal.emit(43);
/// assert_eq!(total.load(Ordering::SeqCst), 42);
/// ```
pub struct ConnectionGuard<Args: Clone + Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Connect a direct slot that is disconnected when the guard drops.
    pub fn connect_scoped<F>(self: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        ConnectionGuard {
            signal: Arc::downgrade(self),
            id,
        }
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
