//! One logical request/response cycle, redirects included.
//!
//! An exchange runs as a future, either spawned on the context's runtime or
//! blocked on by the caller. Every write to the client's state goes through
//! [`Shared::update`], which drops the write unless the exchange is still the
//! client's current one and has not been aborted. A stale or aborted exchange
//! can therefore finish at any time without disturbing its successor.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::{FutureExt, StreamExt};
use ows_bridge_core::Signal;
use ows_bridge_core::logging::{span_names, targets};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::Instrument;
use url::Url;

use crate::auth::{AuthChallenge, Authentication, Authorizer, Credentials};
use crate::bridge::Handshake;
use crate::cache::annotate_metadata;
use crate::context::NetworkContext;
use crate::error::{NetworkError, Result};
use crate::http::{ReplyHead, TransferProgress, TransportReply, TransportRequest};
use crate::request::{ErrorCode, RequestConfig};

/// Upper bound for pre-allocating a response buffer.
pub(crate) const READ_BUFFER_SIZE_HINT: u64 = 1024 * 1024;

/// Unique identifier for an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExchangeId(u64);

impl ExchangeId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-client state of the current exchange.
#[derive(Debug, Default)]
pub(crate) struct ExchangeState {
    pub(crate) current: Option<ExchangeId>,
    /// Dropping or firing this releases the live transport.
    pub(crate) cancel: Option<oneshot::Sender<()>>,
    pub(crate) response: Bytes,
    pub(crate) error_code: ErrorCode,
    pub(crate) error_message: String,
    pub(crate) aborted: bool,
    pub(crate) timed_out: bool,
    pub(crate) got_non_empty_response: bool,
}

/// State and notifications shared between a client and its exchanges.
pub(crate) struct Shared {
    pub(crate) state: Mutex<ExchangeState>,
    pub(crate) download_progress: Signal<TransferProgress>,
    pub(crate) download_finished: Signal<()>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ExchangeState::default()),
            download_progress: Signal::new(),
            download_finished: Signal::new(),
        }
    }

    /// Apply `f` if `id` is current and not aborted.
    pub(crate) fn update<R>(&self, id: ExchangeId, f: impl FnOnce(&mut ExchangeState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        (state.current == Some(id) && !state.aborted).then(|| f(&mut state))
    }

    pub(crate) fn is_live(&self, id: ExchangeId) -> bool {
        self.update(id, |_| ()).is_some()
    }

    pub(crate) fn mark_timed_out(&self, id: ExchangeId) {
        let mut state = self.state.lock();
        if state.current == Some(id) {
            state.timed_out = true;
        }
    }
}

/// A started exchange, ready to be driven.
pub(crate) struct Exchange {
    pub(crate) id: ExchangeId,
    pub(crate) shared: Arc<Shared>,
    pub(crate) context: NetworkContext,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) config: RequestConfig,
    pub(crate) force_refresh: bool,
}

impl Exchange {
    /// Drive the exchange to completion.
    ///
    /// Resolves to `false` if the exchange was cancelled or the live reply
    /// failed authorization. The finished notification is emitted here
    /// unless the exchange was aborted, in which case the abort reported it.
    pub(crate) async fn run(
        self,
        request: TransportRequest,
        cancel: oneshot::Receiver<()>,
        owner: Option<Arc<Handshake>>,
    ) -> bool {
        let span = tracing::debug_span!(
            target: targets::REQUEST,
            span_names::EXCHANGE,
            id = %self.id,
            url = %request.url
        );

        async {
            let success = tokio::select! {
                biased;
                _ = cancel => {
                    tracing::debug!(target: targets::REQUEST, "exchange cancelled");
                    false
                }
                success = self.drive(request, owner.as_deref()) => success,
            };
            self.finish();
            success
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, mut request: TransportRequest, owner: Option<&Handshake>) -> bool {
        let mut visited = HashSet::from([request.url.clone()]);
        let mut hops = 0;
        let mut challenged = false;
        let mut prompted: Option<Authentication> = None;

        loop {
            tracing::debug!(target: targets::REQUEST, method = %request.method, url = %request.url, "calling");
            let mut reply = match self.watch(self.context.transport().send(request.clone())).await {
                Ok(reply) => reply,
                Err(err) => {
                    self.fail_transfer(&err.to_string());
                    return true;
                }
            };

            if let Err(err) = self.authorizer.authorize_reply(&mut reply.head) {
                self.fail_authorization(&err);
                return false;
            }

            if matches!(reply.head.status, 401 | 407) && !challenged {
                let challenge = AuthChallenge::from_reply(&reply.head);
                if let Some(credentials) = self.prompt_credentials(challenge, owner).await {
                    challenged = true;
                    drop(reply);
                    let authentication = credentials.authentication();
                    if let Err(err) = authentication.authorize_request(&mut request) {
                        self.fail_authorization(&err);
                        return true;
                    }
                    prompted = Some(authentication);
                    continue;
                }
            }

            if let Some(reason) = reply.head.error_string() {
                self.fail_transfer(&reason);
                return true;
            }

            let body = match self.read_body(&mut reply).await {
                Ok(body) => body,
                Err(err) => {
                    self.fail_transfer(&err.to_string());
                    return true;
                }
            };

            let Some(target) = reply.head.redirect_target.clone() else {
                self.complete(&request.url, &reply.head, body);
                return true;
            };
            drop(reply);

            if visited.contains(&target) {
                self.fail_redirect_loop(&target);
                return true;
            }
            hops += 1;
            if hops > self.context.config().max_redirects {
                self.fail_transfer(&NetworkError::TooManyRedirects.to_string());
                return true;
            }

            tracing::debug!(
                target: targets::REQUEST,
                to = %target,
                force_refresh = self.force_refresh,
                "redirected"
            );
            let mut next = TransportRequest::get(target.clone()).with_cache_directives(self.force_refresh);
            let mut authorized = self.authorizer.authorize_request(&mut next);
            if let (Ok(()), Some(authentication)) = (&authorized, &prompted) {
                authorized = authentication.authorize_request(&mut next);
            }
            if let Err(err) = authorized {
                self.fail_authorization(&err);
                return true;
            }
            visited.insert(target);
            request = next;
        }
    }

    // Bounds one await by the stall timeout.
    async fn watch<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.context.config().timeout;
        match tokio::time::timeout(timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(target: targets::REQUEST, id = %self.id, ?timeout, "no progress, timing out");
                self.context.request_timed_out().emit(self.id);
                Err(NetworkError::Cancelled)
            }
        }
    }

    async fn read_body(&self, reply: &mut TransportReply) -> Result<BytesMut> {
        let total = reply.head.content_length;
        let redirecting = reply.head.redirect_target.is_some();
        let capacity = total.map_or(0, |len| len.min(READ_BUFFER_SIZE_HINT)) as usize;
        let mut body = BytesMut::with_capacity(capacity);

        while let Some(chunk) = self
            .watch(reply.body.next().map(Option::transpose))
            .await?
        {
            body.extend_from_slice(&chunk);
            self.progress(body.len() as u64, total, redirecting);
        }
        Ok(body)
    }

    fn progress(&self, received: u64, total: Option<u64>, redirecting: bool) {
        let live = self.shared.update(self.id, |state| {
            if received != 0 {
                state.got_non_empty_response = true;
            }
        });
        tracing::trace!(
            target: targets::REQUEST,
            received,
            total = ?total,
            "downloaded"
        );
        // No progress for a reply that only redirects.
        if live.is_some() && !redirecting {
            self.shared.download_progress.emit(TransferProgress {
                bytes_transferred: received,
                total_bytes: total,
            });
        }
    }

    async fn prompt_credentials(&self, challenge: AuthChallenge, owner: Option<&Handshake>) -> Option<Credentials> {
        let provider = self.context.credential_provider()?.clone();
        tracing::debug!(
            target: targets::BRIDGE,
            url = %challenge.url,
            proxy = challenge.proxy,
            "authentication required"
        );

        let (answer_tx, answer_rx) = oneshot::channel();
        self.context.events().post(move || {
            let _ = answer_tx.send(provider.credentials(&challenge));
        });
        if let Some(owner) = owner {
            owner.resume_owner();
        }
        answer_rx.await.ok().flatten()
    }

    fn complete(&self, url: &Url, head: &ReplyHead, body: BytesMut) {
        if !self.shared.is_live(self.id) {
            return;
        }
        tracing::debug!(target: targets::REQUEST, from_cache = head.from_cache, "reply ok");

        match self.context.cache() {
            Some(cache) => {
                annotate_metadata(cache.as_ref(), url, self.config.default_expiration);
            }
            None => tracing::debug!(target: targets::REQUEST, "no cache"),
        }

        let empty = self.shared.update(self.id, |state| {
            state.response = body.freeze();
            let empty = state.response.is_empty() && !state.got_non_empty_response;
            if empty {
                state.error_message = format!("empty response: {url}");
                state.error_code = ErrorCode::ServerException;
            }
            empty
        });
        if empty == Some(true) {
            tracing::warn!(target: targets::REQUEST, "empty response: {url}");
        }
    }

    fn fail_transfer(&self, reason: &str) {
        self.fail(ErrorCode::ServerException, self.config.error_message_with_reason(reason));
    }

    fn fail_authorization(&self, err: &NetworkError) {
        tracing::debug!(target: targets::REQUEST, %err, "authorization failed");
        self.fail(ErrorCode::Network, self.config.failed_auth_message());
    }

    fn fail_redirect_loop(&self, target: &Url) {
        self.fail(ErrorCode::ServerException, format!("Redirect loop detected: {target}"));
    }

    fn fail(&self, code: ErrorCode, message: String) {
        let recorded = self.shared.update(self.id, |state| {
            state.error_code = code;
            state.error_message.clone_from(&message);
            state.response = Bytes::new();
        });
        if recorded.is_some() {
            tracing::warn!(target: targets::REQUEST, ?code, "{message}");
        }
    }

    fn finish(&self) {
        let live = self.shared.update(self.id, |state| {
            if state.timed_out {
                state.error_code = ErrorCode::Timeout;
                state.response = Bytes::new();
            }
            state.cancel = None;
        });
        if live.is_none() {
            tracing::debug!(target: targets::REQUEST, id = %self.id, "aborted exchange wound down");
            return;
        }
        tracing::debug!(target: targets::REQUEST, id = %self.id, "download finished");
        self.shared.download_finished.emit(());
    }
}
