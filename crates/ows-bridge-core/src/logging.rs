//! Logging facilities for ows-bridge.
//!
//! ows-bridge uses the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("ows_bridge=debug")
//!     .init();
//! ```
//!
//! Request failures that a user should see are logged at `warn` under
//! [`targets::REQUEST`]; exchange flow is logged at `debug` and per-chunk
//! progress at `trace`.

/// Target names for log filtering.
pub mod targets {
    /// Request dispatcher, redirect handling and completion.
    pub const REQUEST: &str = "ows_bridge::request";
    /// Transport implementations.
    pub const TRANSPORT: &str = "ows_bridge::transport";
    /// Response cache and cache metadata annotation.
    pub const CACHE: &str = "ows_bridge::cache";
    /// Owning-thread bridge handshake.
    pub const BRIDGE: &str = "ows_bridge::bridge";
    /// Signal/slot system.
    pub const SIGNAL: &str = "ows_bridge_core::signal";
    /// Owning-thread event queue.
    pub const EVENT_QUEUE: &str = "ows_bridge_core::event_queue";
}

/// Span names used for timing.
pub mod span_names {
    /// One network exchange, redirects included.
    pub const EXCHANGE: &str = "ows_bridge::exchange";
    /// A blocking call waiting on a worker thread.
    pub const BRIDGE_WAIT: &str = "ows_bridge::bridge_wait";
}

/// A guard that keeps a timing span entered until dropped.
///
/// ```
/// use ows_bridge_core::logging::PerfSpan;
///
/// {
///     let _span = PerfSpan::new("load_capabilities");
///     // ... timed work ...
/// }
/// ```
pub struct PerfSpan {
    _span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Enter a new performance span for `operation`.
    pub fn new(operation: &'static str) -> Self {
        let span = tracing::info_span!(target: "ows_bridge::perf", "perf", operation);
        Self {
            _span: span.entered(),
        }
    }
}
