//! Thread affinity checks.
//!
//! Network transports are affine to the thread that owns the network stack.
//! [`ThreadAffinity`] records that thread and answers "am I on it?".
//!
//! ```
//! use ows_bridge_core::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! std::thread::spawn(move || assert!(!affinity.is_same_thread()))
//!     .join()
//!     .unwrap();
//! ```

use std::thread::ThreadId;

/// Tracks the thread an object is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadAffinity {
    thread_id: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Bind to the current thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            thread_id: std::thread::current().id(),
        }
    }

    /// Get the thread ID this affinity is bound to.
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Check if the current thread matches this affinity.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Assert that we are on the bound thread.
    ///
    /// # Panics
    ///
    /// Panics with `msg` if called from a different thread.
    #[track_caller]
    pub fn assert_same_thread_with_msg(&self, msg: &str) {
        let current = std::thread::current();
        if current.id() != self.thread_id {
            panic!(
                "{msg}: expected thread {:?}, running on {:?} ({})",
                self.thread_id,
                current.id(),
                current.name().unwrap_or("<unnamed>")
            );
        }
    }

    /// Debug-only variant of [`assert_same_thread_with_msg`](Self::assert_same_thread_with_msg).
    #[inline]
    #[track_caller]
    pub fn debug_assert_same_thread(&self) {
        if cfg!(debug_assertions) {
            self.assert_same_thread_with_msg("object accessed from wrong thread");
        }
    }
}
