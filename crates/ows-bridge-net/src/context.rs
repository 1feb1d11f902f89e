//! The network context shared by request clients.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ows_bridge_core::logging::targets;
use ows_bridge_core::{EventQueue, Signal};
use tokio::runtime::{Handle, Runtime};

use crate::auth::CredentialProvider;
use crate::cache::ResponseCache;
use crate::error::{NetworkError, Result};
use crate::exchange::ExchangeId;
use crate::http::{DefaultTransport, Transport};

/// Configuration for a [`NetworkContext`].
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Longest time an exchange may go without progress.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to enable cookie storage.
    pub cookies_enabled: bool,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
    /// Worker threads of the async runtime.
    pub worker_threads: usize,
    /// Maximum number of redirects followed by one exchange.
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Some(Duration::from_secs(10)),
            cookies_enabled: true,
            user_agent: Some(format!("ows-bridge/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            proxy: None,
            worker_threads: 2,
            max_redirects: 10,
        }
    }
}

/// Builder for a [`NetworkContext`].
pub struct NetworkContextBuilder {
    config: NetworkConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn ResponseCache>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl Default for NetworkContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkContextBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: NetworkConfig::default(),
            transport: None,
            cache: None,
            credentials: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: NetworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the stall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable cookie storage.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set a proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Set the number of async worker threads.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads.max(1);
        self
    }

    /// Set the maximum number of redirects per exchange.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Use a custom transport instead of [`DefaultTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attach a shared response cache.
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Answer authentication challenges with `provider`.
    pub fn credential_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Build the context.
    ///
    /// The calling thread becomes the context's owning thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime or the default transport cannot be
    /// created.
    pub fn build(self) -> Result<NetworkContext> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .thread_name("ows-bridge-net")
            .enable_all()
            .build()
            .map_err(|err| NetworkError::Runtime(err.to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(DefaultTransport::new(&self.config, self.cache.clone())?),
        };

        let events = EventQueue::new();
        tracing::debug!(
            target: targets::BRIDGE,
            owner = ?events.affinity().thread_id(),
            timeout = ?self.config.timeout,
            "network context created"
        );

        Ok(NetworkContext {
            inner: Arc::new(ContextInner {
                handle: runtime.handle().clone(),
                runtime: Some(runtime),
                transport,
                cache: self.cache,
                credentials: self.credentials,
                events,
                config: self.config,
                request_timed_out: Arc::new(Signal::new()),
            }),
        })
    }
}

struct ContextInner {
    handle: Handle,
    runtime: Option<Runtime>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResponseCache>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    events: EventQueue,
    config: NetworkConfig,
    request_timed_out: Arc<Signal<ExchangeId>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // The last clone may be released by a task running on this runtime.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Owner of the network stack shared by request clients.
///
/// A context bundles the async runtime, the [`Transport`], the optional
/// shared [`ResponseCache`] and [`CredentialProvider`], and the event queue
/// of its owning thread (the thread that built it). Credential prompts are
/// posted to that queue; synchronous requests made on the owning thread keep
/// pumping it while they wait.
///
/// Cloning is cheap; clones share everything.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ows_bridge_net::{NetworkContext, OwsRequest, RequestOptions};
///
/// let context = NetworkContext::builder()
///     .timeout(Duration::from_secs(30))
///     .build()?;
///
/// let request = OwsRequest::new(&context);
/// if request.send_get("https://example.com/wfs?REQUEST=GetCapabilities", RequestOptions::default()) {
///     println!("{} bytes", request.response().len());
/// }
/// # Ok::<(), ows_bridge_net::NetworkError>(())
/// ```
#[derive(Clone)]
pub struct NetworkContext {
    inner: Arc<ContextInner>,
}

impl NetworkContext {
    /// Create a context with default configuration.
    ///
    /// # Errors
    ///
    /// See [`NetworkContextBuilder::build`].
    pub fn new() -> Result<Self> {
        NetworkContextBuilder::new().build()
    }

    /// Create a builder for configuring a new context.
    pub fn builder() -> NetworkContextBuilder {
        NetworkContextBuilder::new()
    }

    /// Get the context's configuration.
    pub fn config(&self) -> &NetworkConfig {
        &self.inner.config
    }

    /// The transport requests are issued through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// The shared response cache, if any.
    pub fn cache(&self) -> Option<&Arc<dyn ResponseCache>> {
        self.inner.cache.as_ref()
    }

    /// The credential provider, if any.
    pub fn credential_provider(&self) -> Option<&Arc<dyn CredentialProvider>> {
        self.inner.credentials.as_ref()
    }

    /// The owning thread's event queue.
    pub fn events(&self) -> &EventQueue {
        &self.inner.events
    }

    /// Check if the current thread owns this context.
    pub fn is_owner_thread(&self) -> bool {
        self.inner.events.is_owner_thread()
    }

    /// Emitted with the exchange id whenever an exchange stalls past the
    /// configured timeout.
    pub fn request_timed_out(&self) -> &Arc<Signal<ExchangeId>> {
        &self.inner.request_timed_out
    }

    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = bool> + Send + 'static,
    {
        drop(self.inner.handle.spawn(future));
    }

    /// Must not be called from within an async context.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.handle.block_on(future)
    }
}

impl std::fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContext")
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache.is_some())
            .field("credentials", &self.inner.credentials.is_some())
            .field("events", &self.inner.events)
            .finish()
    }
}
