//! Core primitives for ows-bridge.
//!
//! This crate provides the building blocks the request bridge is assembled
//! from:
//!
//! - **Signal/Slot System**: [`Signal`] observer lists with direct and queued
//!   delivery
//! - **Event Queue**: [`EventQueue`], a task queue pumped by its owning thread
//! - **Thread Affinity**: [`ThreadAffinity`] checks for thread-bound objects
//! - **Logging**: `tracing` targets and timing spans
//!
//! # Example
//!
//! ```
//! use ows_bridge_core::{EventQueue, Signal};
//!
//! let queue = EventQueue::new();
//! let finished = Signal::<()>::new();
//!
//! finished.connect_queued(&queue, |_| println!("finished, on the owner"));
//! finished.emit(());
//!
//! queue.process_events().unwrap();
//! ```

mod error;
pub mod event_queue;
pub mod logging;
pub mod signal;
pub mod thread_check;

pub use error::{CoreError, Result};
pub use event_queue::EventQueue;
pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal};
pub use thread_check::ThreadAffinity;
