//! The transport seam and its default implementation.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, StreamExt};

use ows_bridge_core::logging::targets;

use super::client::build_client;
use super::request::{CacheLoadControl, HttpMethod, TransportRequest};
use super::response::{ReplyHead, TransportReply};
use crate::cache::{CacheMetadata, CachedResponse, ResponseCache, is_storable};
use crate::context::NetworkConfig;
use crate::error::{NetworkError, Result};

/// Performs one request/reply round trip.
///
/// Implementations must not follow redirects: a 3xx reply is returned as is,
/// with [`ReplyHead::redirect_target`] resolved.
pub trait Transport: Send + Sync {
    /// Send `request` and resolve once the reply head is available.
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, Result<TransportReply>>;
}

/// The stock transport.
///
/// `http` and `https` URLs go through `reqwest`; `file` URLs are read from
/// disk. When a shared cache is attached, GET requests honour their cache
/// directives: [`CacheLoadControl::PreferCache`] serves a fresh entry without
/// touching the network, and `cache_save` stores storable replies once their
/// body has been read to the end.
pub struct DefaultTransport {
    client: reqwest::Client,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl DefaultTransport {
    /// Create a transport from the network configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, for instance
    /// because of an invalid proxy URL.
    pub fn new(config: &NetworkConfig, cache: Option<Arc<dyn ResponseCache>>) -> Result<Self> {
        Ok(Self::with_client(build_client(config)?, cache))
    }

    /// Create a transport around an existing `reqwest` client.
    ///
    /// The client should have redirects disabled.
    pub fn with_client(client: reqwest::Client, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        Self { client, cache }
    }
}

impl Transport for DefaultTransport {
    fn send(&self, request: TransportRequest) -> BoxFuture<'static, Result<TransportReply>> {
        match request.url.scheme() {
            "http" | "https" => {
                send_http(self.client.clone(), self.cache.clone(), request).boxed()
            }
            "file" => read_local_file(request).boxed(),
            other => future::ready(Err(NetworkError::UnsupportedScheme(other.to_string()))).boxed(),
        }
    }
}

impl std::fmt::Debug for DefaultTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultTransport")
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

async fn send_http(
    client: reqwest::Client,
    cache: Option<Arc<dyn ResponseCache>>,
    request: TransportRequest,
) -> Result<TransportReply> {
    let cache = cache.filter(|_| request.method == HttpMethod::Get);

    if request.cache_load == CacheLoadControl::PreferCache {
        if let Some(entry) = cache.as_ref().and_then(|cache| cache.lookup(&request.url)) {
            if entry.metadata.is_fresh(Utc::now()) {
                tracing::debug!(target: targets::TRANSPORT, url = %request.url, "serving from cache");
                return Ok(reply_from_cache(entry));
            }
        }
    }

    tracing::debug!(target: targets::TRANSPORT, method = %request.method, url = %request.url, "sending");
    let mut builder = client
        .request(request.method.to_reqwest(), request.url.clone())
        .headers(request.headers);
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    let response = builder.send().await?;

    let mut head = ReplyHead::new(request.url, response.status().as_u16());
    head.headers = response.headers().clone();
    head.content_length = response.content_length();
    head.resolve_redirect();

    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(NetworkError::from))
        .boxed();

    let body = match cache {
        Some(cache) if request.cache_save && is_storable(&head) => store_when_complete(cache, &head, body),
        _ => body,
    };

    Ok(TransportReply { head, body })
}

fn reply_from_cache(entry: CachedResponse) -> TransportReply {
    let mut head = ReplyHead::new(entry.metadata.url.clone(), entry.status);
    for (name, value) in &entry.metadata.raw_headers {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            head.headers.append(name, value);
        }
    }
    head.content_length = Some(entry.body.len() as u64);
    head.from_cache = true;
    head.resolve_redirect();
    TransportReply::from_bytes(head, entry.body)
}

// Passes chunks through and stores the complete body once the stream ends.
fn store_when_complete(
    cache: Arc<dyn ResponseCache>,
    head: &ReplyHead,
    mut body: BoxStream<'static, Result<Bytes>>,
) -> BoxStream<'static, Result<Bytes>> {
    let metadata = CacheMetadata::from_reply(head, Utc::now());
    let status = head.status;

    async_stream::stream! {
        let mut stored = BytesMut::new();
        let mut complete = true;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    stored.extend_from_slice(&bytes);
                    yield Ok(bytes);
                }
                Err(err) => {
                    complete = false;
                    yield Err(err);
                    break;
                }
            }
        }
        if complete {
            tracing::debug!(target: targets::CACHE, url = %metadata.url, bytes = stored.len(), "storing reply");
            cache.insert(CachedResponse {
                metadata,
                status,
                body: stored.freeze(),
            });
        }
    }
    .boxed()
}

async fn read_local_file(request: TransportRequest) -> Result<TransportReply> {
    let path = request
        .url
        .to_file_path()
        .map_err(|()| NetworkError::InvalidUrl(format!("not a local file: {}", request.url)))?;

    tracing::debug!(target: targets::TRANSPORT, path = %path.display(), "reading local file");
    let data = tokio::fs::read(&path)
        .await
        .map_err(|err| NetworkError::Io(format!("{}: {err}", path.display())))?;

    let mut head = ReplyHead::new(request.url, 200);
    head.content_length = Some(data.len() as u64);
    Ok(TransportReply::from_bytes(head, Bytes::from(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use url::Url;

    async fn collect(reply: TransportReply) -> Vec<u8> {
        let chunks: Vec<Result<Bytes>> = reply.body.collect().await;
        chunks
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect()
    }

    fn transport(cache: Option<Arc<dyn ResponseCache>>) -> DefaultTransport {
        DefaultTransport::new(&NetworkConfig::default(), cache).unwrap()
    }

    #[tokio::test]
    async fn test_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capabilities.xml");
        std::fs::write(&path, "<WFS_Capabilities/>").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let reply = transport(None).send(TransportRequest::get(url)).await.unwrap();

        assert_eq!(reply.head.status, 200);
        assert_eq!(reply.head.content_length, Some(19));
        assert_eq!(collect(reply).await, b"<WFS_Capabilities/>");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.xml")).unwrap();
        let result = transport(None).send(TransportRequest::get(url)).await;
        assert!(matches!(result, Err(NetworkError::Io(_))));
    }

    #[tokio::test]
    async fn test_unknown_scheme() {
        let url = Url::parse("ftp://example.com/wfs").unwrap();
        let err = transport(None)
            .send(TransportRequest::get(url))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Protocol \"ftp\" is unknown");
    }

    #[tokio::test]
    async fn test_fresh_cache_entry_is_served_without_network() {
        let cache = Arc::new(MemoryCache::new());
        // Nothing listens on this port, so only the cache can answer.
        let url = Url::parse("http://127.0.0.1:9/wfs?REQUEST=GetCapabilities").unwrap();
        let mut metadata = CacheMetadata::new(url.clone());
        metadata.expiration = Some(Utc::now() + chrono::TimeDelta::hours(1));
        cache.insert(CachedResponse {
            metadata,
            status: 200,
            body: Bytes::from_static(b"cached"),
        });

        let reply = transport(Some(cache))
            .send(TransportRequest::get(url).with_cache_directives(false))
            .await
            .unwrap();
        assert!(reply.head.from_cache);
        assert_eq!(collect(reply).await, b"cached");
    }
}
