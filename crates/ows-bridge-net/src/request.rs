//! The request client: one in-flight exchange at a time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ows_bridge_core::logging::targets;
use ows_bridge_core::{ConnectionGuard, Signal};
use tokio::sync::oneshot;
use url::Url;

use crate::auth::{Authorizer, NoAuth};
use crate::bridge::{self, Handshake};
use crate::context::NetworkContext;
use crate::exchange::{Exchange, ExchangeId, Shared};
use crate::fake_endpoint::{is_fake_endpoint, local_file_url, with_post_data};
use crate::http::{PostOptions, RequestOptions, TransferProgress, TransportRequest};

/// Outcome classification of an exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The exchange succeeded.
    #[default]
    NoError,
    /// Authorization or transport setup failed.
    Network,
    /// The server failed, replied with nothing, or redirected in a loop.
    ServerException,
    /// The exchange stalled past the configured timeout.
    Timeout,
}

/// A failed exchange: its code plus the user-visible message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestError {
    /// What went wrong.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for RequestError {}

/// Per-client settings.
#[derive(Clone, Debug)]
pub struct RequestConfig {
    /// Prefix of every transfer error message, such as
    /// "Download of capabilities failed".
    pub error_context: String,
    /// Minimum lifetime forced onto cache entries that carry no expiration.
    pub default_expiration: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            error_context: "Download of the resource failed".to_string(),
            default_expiration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl RequestConfig {
    /// Format a failure `reason` for this client.
    pub fn error_message_with_reason(&self, reason: &str) -> String {
        format!("{}: {reason}", self.error_context)
    }

    pub(crate) fn failed_auth_message(&self) -> String {
        self.error_message_with_reason("network request update failed for authentication config")
    }
}

/// Builder for an [`OwsRequest`].
pub struct OwsRequestBuilder {
    context: NetworkContext,
    config: RequestConfig,
    authorizer: Arc<dyn Authorizer>,
}

impl OwsRequestBuilder {
    /// Set the error message prefix.
    pub fn error_context(mut self, context: impl Into<String>) -> Self {
        self.config.error_context = context.into();
        self
    }

    /// Set the minimum cache lifetime.
    pub fn default_expiration(mut self, expiration: Duration) -> Self {
        self.config.default_expiration = expiration;
        self
    }

    /// Authorize requests and replies with `authorizer`.
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Build the client.
    pub fn build(self) -> OwsRequest {
        let shared = Arc::new(Shared::new());
        let weak = Arc::downgrade(&shared);
        let timeout_slot = self.context.request_timed_out().connect_scoped(move |id| {
            if let Some(shared) = weak.upgrade() {
                shared.mark_timed_out(*id);
            }
        });

        OwsRequest {
            context: self.context,
            config: self.config,
            authorizer: self.authorizer,
            shared,
            _timeout_slot: timeout_slot,
        }
    }
}

/// A web-service request client with synchronous semantics over the async
/// network stack.
///
/// A client runs at most one exchange at a time: every send aborts the
/// previous exchange first. Results are read back through
/// [`response`](Self::response), [`error_code`](Self::error_code) and
/// [`error_message`](Self::error_message), or all at once through
/// [`result`](Self::result).
///
/// Progress and completion are reported through
/// [`download_progress`](Self::download_progress) and
/// [`download_finished`](Self::download_finished). Progress is always
/// delivered before the single finished notification of its exchange.
///
/// URLs containing [`FAKE_ENDPOINT_MARKER`](crate::fake_endpoint::FAKE_ENDPOINT_MARKER)
/// are served from local files, see [`fake_endpoint`](crate::fake_endpoint).
pub struct OwsRequest {
    context: NetworkContext,
    config: RequestConfig,
    authorizer: Arc<dyn Authorizer>,
    shared: Arc<Shared>,
    _timeout_slot: ConnectionGuard<ExchangeId>,
}

impl OwsRequest {
    /// Create a client with default settings and no authorization.
    pub fn new(context: &NetworkContext) -> Self {
        Self::builder(context).build()
    }

    /// Create a builder for configuring a new client.
    pub fn builder(context: &NetworkContext) -> OwsRequestBuilder {
        OwsRequestBuilder {
            context: context.clone(),
            config: RequestConfig::default(),
            authorizer: Arc::new(NoAuth),
        }
    }

    /// Get the client's settings.
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Issue a GET request.
    ///
    /// Synchronous calls block until the exchange finishes and return whether
    /// it succeeded. Asynchronous calls return `true` once the exchange has
    /// started; watch [`download_finished`](Self::download_finished) for the
    /// outcome.
    ///
    /// # Panics
    ///
    /// A synchronous call panics if made from within an async context.
    pub fn send_get(&self, url: &str, options: RequestOptions) -> bool {
        let id = self.begin();

        let resolved = if is_fake_endpoint(url) {
            tracing::debug!(target: targets::REQUEST, url, "substituting local file");
            local_file_url(url)
        } else {
            Url::parse(url).map_err(Into::into)
        };
        let url = match resolved {
            Ok(url) => url,
            Err(err) => return self.fail_setup(id, &err.to_string()),
        };

        let mut request = TransportRequest::get(url);
        if options.use_cache {
            request = request.with_cache_directives(options.force_refresh);
        }
        self.dispatch(id, request, options.force_refresh, options.synchronous)
    }

    /// Issue a synchronous POST request.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context.
    pub fn send_post(&self, url: &str, content_type: &str, body: impl Into<Bytes>) -> bool {
        self.send_post_with(url, content_type, body, PostOptions::default())
    }

    /// Issue a POST request with explicit options.
    ///
    /// POST requests never use cached responses. For the fake endpoint the
    /// body is folded into the query as `POSTDATA` and fetched with GET.
    ///
    /// # Panics
    ///
    /// A synchronous call panics if made from within an async context.
    pub fn send_post_with(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        options: PostOptions,
    ) -> bool {
        let body = body.into();
        if is_fake_endpoint(url) {
            let folded = with_post_data(url, &body);
            let get_options = RequestOptions {
                synchronous: options.synchronous,
                ..RequestOptions::default()
            }
            .force_refresh()
            .no_cache();
            return self.send_get(&folded, get_options);
        }

        let id = self.begin();
        let request = Url::parse(url)
            .map_err(Into::into)
            .and_then(|url| TransportRequest::post(url, content_type, body));
        match request {
            Ok(request) => self.dispatch(id, request, true, options.synchronous),
            Err(err) => self.fail_setup(id, &err.to_string()),
        }
    }

    /// Abort the current exchange, if any.
    ///
    /// The transport is released and [`download_finished`](Self::download_finished)
    /// is emitted for the aborted exchange before this returns. A completion
    /// that still arrives later is dropped: it neither touches the recorded
    /// response and error nor emits a second notification.
    pub fn abort(&self) {
        if self.cancel_current() {
            self.shared.download_finished.emit(());
        }
    }

    /// The body of the last successful exchange.
    pub fn response(&self) -> Bytes {
        self.shared.state.lock().response.clone()
    }

    /// The error code of the last exchange.
    pub fn error_code(&self) -> ErrorCode {
        self.shared.state.lock().error_code
    }

    /// The error message of the last exchange, empty on success.
    pub fn error_message(&self) -> String {
        self.shared.state.lock().error_message.clone()
    }

    /// Check if the current exchange was aborted.
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().aborted
    }

    /// Check if the current exchange stalled past the timeout.
    pub fn timed_out(&self) -> bool {
        self.shared.state.lock().timed_out
    }

    /// The outcome of the last exchange as a `Result`.
    pub fn result(&self) -> Result<Bytes, RequestError> {
        let state = self.shared.state.lock();
        if state.error_code == ErrorCode::NoError && state.error_message.is_empty() {
            Ok(state.response.clone())
        } else {
            Err(RequestError {
                code: state.error_code,
                message: state.error_message.clone(),
            })
        }
    }

    /// Emitted with the running byte count as body chunks arrive.
    pub fn download_progress(&self) -> &Signal<TransferProgress> {
        &self.shared.download_progress
    }

    /// Emitted once when an exchange ends, however it ends.
    ///
    /// An exchange replaced by a new send is reported as finished before the
    /// new one starts, so a notification always refers to the exchange whose
    /// state [`result`](Self::result) returns.
    pub fn download_finished(&self) -> &Signal<()> {
        &self.shared.download_finished
    }

    // Mark the current exchange aborted and fire its cancel handle. Returns
    // whether an exchange was still in flight.
    fn cancel_current(&self) -> bool {
        let mut state = self.shared.state.lock();
        state.aborted = true;
        let Some(cancel) = state.cancel.take() else {
            return false;
        };
        tracing::debug!(target: targets::REQUEST, id = ?state.current, "aborting exchange");
        let _ = cancel.send(());
        true
    }

    // Abort the previous exchange and reset state for a new one.
    fn begin(&self) -> ExchangeId {
        self.abort();
        let id = ExchangeId::next();
        let mut state = self.shared.state.lock();
        state.current = Some(id);
        state.aborted = false;
        state.timed_out = false;
        state.got_non_empty_response = false;
        state.error_message.clear();
        state.error_code = ErrorCode::NoError;
        state.response = Bytes::new();
        id
    }

    fn dispatch(&self, id: ExchangeId, mut request: TransportRequest, force_refresh: bool, synchronous: bool) -> bool {
        if let Err(err) = self.authorizer.authorize_request(&mut request) {
            tracing::debug!(target: targets::REQUEST, %err, "request authorization failed");
            let message = self.config.failed_auth_message();
            return self.record_failure(id, message);
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        if self.shared.update(id, |state| state.cancel = Some(cancel_tx)).is_none() {
            return false;
        }

        let exchange = Exchange {
            id,
            shared: self.shared.clone(),
            context: self.context.clone(),
            authorizer: self.authorizer.clone(),
            config: self.config.clone(),
            force_refresh,
        };

        if !synchronous {
            self.context.spawn(exchange.run(request, cancel_rx, None));
            return true;
        }

        let success = if self.context.is_owner_thread() {
            let handshake = Arc::new(Handshake::new());
            let exchange = exchange.run(request, cancel_rx, Some(handshake.clone()));
            match bridge::run_on_worker(&self.context, &handshake, exchange) {
                Ok(success) => success,
                Err(err) => return self.fail_setup(id, &err.to_string()),
            }
        } else {
            self.context.block_on(exchange.run(request, cancel_rx, None))
        };

        success && self.shared.state.lock().error_message.is_empty()
    }

    fn fail_setup(&self, id: ExchangeId, reason: &str) -> bool {
        let message = self.config.error_message_with_reason(reason);
        self.record_failure(id, message)
    }

    fn record_failure(&self, id: ExchangeId, message: String) -> bool {
        self.shared.update(id, |state| {
            state.error_code = ErrorCode::Network;
            state.error_message.clone_from(&message);
            state.cancel = None;
        });
        tracing::warn!(target: targets::REQUEST, "{message}");
        false
    }
}

impl Drop for OwsRequest {
    fn drop(&mut self) {
        self.cancel_current();
    }
}

impl fmt::Debug for OwsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("OwsRequest")
            .field("config", &self.config)
            .field("current", &state.current)
            .field("error_code", &state.error_code)
            .finish()
    }
}
