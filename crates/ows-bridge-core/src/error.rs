//! Error types for ows-bridge core primitives.

use std::thread::ThreadId;

use thiserror::Error;

/// Errors raised by the core primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An owning-thread operation was attempted from another thread.
    #[error("operation requires owning thread {expected:?}, called from {actual:?}")]
    WrongThread {
        /// The owning thread.
        expected: ThreadId,
        /// The calling thread.
        actual: ThreadId,
    },
    /// The event queue can no longer deliver tasks.
    #[error("event queue closed")]
    QueueClosed,
}

/// A specialized Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
