//! HTTP plumbing beneath the request bridge.
//!
//! A [`Transport`] turns one [`TransportRequest`] into one [`TransportReply`]
//! without following redirects. [`DefaultTransport`] does this with `reqwest`
//! for remote URLs and with a file read for `file://` URLs.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use ows_bridge_net::http::{DefaultTransport, Transport, TransportRequest};
//! use ows_bridge_net::NetworkConfig;
//!
//! # async fn run() -> ows_bridge_net::Result<()> {
//! let transport = DefaultTransport::new(&NetworkConfig::default(), None)?;
//! let url = url::Url::parse("https://example.com/wfs?REQUEST=GetCapabilities")?;
//! let mut reply = transport.send(TransportRequest::get(url)).await?;
//! println!("status {}", reply.head.status);
//! while let Some(chunk) = reply.body.next().await {
//!     println!("{} bytes", chunk?.len());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod request;
mod response;
mod transport;

pub use request::{CacheLoadControl, HttpMethod, PostOptions, RequestOptions, TransportRequest};
pub use response::{ReplyHead, TransferProgress, TransportReply};
pub use transport::{DefaultTransport, Transport};
