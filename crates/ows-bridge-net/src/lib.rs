//! Blocking web-service requests over an async network stack.
//!
//! This crate implements the request side of an OGC web-service client (WFS
//! and friends):
//!
//! - **Request Dispatcher**: [`OwsRequest`] issues GET/POST requests, one
//!   exchange at a time, with synchronous or asynchronous completion
//! - **Redirect Handler**: redirects are followed hop by hop, re-authorized,
//!   and rejected when they loop or exceed the configured limit
//! - **Cache Annotator**: after a successful exchange the shared
//!   [`ResponseCache`] entry loses its `Cache-Control` header and receives a
//!   minimum expiration
//! - **Thread Bridge**: a synchronous call on the [`NetworkContext`]'s owning
//!   thread keeps servicing that thread's events, so credential prompts can
//!   run while it waits
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ows_bridge_net::cache::MemoryCache;
//! use ows_bridge_net::{ErrorCode, NetworkContext, OwsRequest, RequestOptions};
//!
//! let context = NetworkContext::builder()
//!     .cache(Arc::new(MemoryCache::new()))
//!     .build()?;
//!
//! let request = OwsRequest::builder(&context)
//!     .error_context("Download of capabilities failed")
//!     .build();
//!
//! request.download_progress().connect(|progress| {
//!     println!("{} bytes", progress.bytes_transferred);
//! });
//!
//! let url = "https://example.com/wfs?SERVICE=WFS&REQUEST=GetCapabilities";
//! if request.send_get(url, RequestOptions::default()) {
//!     println!("capabilities: {} bytes", request.response().len());
//! } else if request.error_code() == ErrorCode::Timeout {
//!     println!("timed out: {}", request.error_message());
//! }
//! # Ok::<(), ows_bridge_net::NetworkError>(())
//! ```
//!
//! # Asynchronous requests
//!
//! ```no_run
//! use ows_bridge_net::{NetworkContext, OwsRequest, RequestOptions};
//!
//! let context = NetworkContext::new()?;
//! let request = OwsRequest::new(&context);
//!
//! // Deliver completion on the owning thread.
//! request.download_finished().connect_queued(context.events(), |_| {
//!     println!("done");
//! });
//!
//! request.send_get("https://example.com/wfs", RequestOptions::default().asynchronous());
//! context.events().wait_for_events(std::time::Duration::from_secs(30)).ok();
//! # Ok::<(), ows_bridge_net::NetworkError>(())
//! ```

pub mod auth;
mod bridge;
pub mod cache;
mod context;
mod error;
mod exchange;
pub mod fake_endpoint;
pub mod http;
mod request;

pub use auth::{AuthChallenge, Authentication, Authorizer, CredentialProvider, Credentials, NoAuth};
pub use cache::{CacheMetadata, ResponseCache};
pub use context::{NetworkConfig, NetworkContext, NetworkContextBuilder};
pub use error::{NetworkError, Result};
pub use exchange::ExchangeId;
pub use http::{PostOptions, RequestOptions, TransferProgress};
pub use request::{ErrorCode, OwsRequest, OwsRequestBuilder, RequestConfig, RequestError};
