//! Reply types produced by transports.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use url::Url;

use crate::error::Result;

/// Status line and headers of a reply, available before the body.
#[derive(Clone, Debug)]
pub struct ReplyHead {
    /// The URL this reply answers.
    pub url: Url,
    /// HTTP status code. Local file replies report 200.
    pub status: u16,
    /// Reason phrase for the status.
    pub reason: String,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// Absolute redirect target, for 3xx replies carrying `Location`.
    pub redirect_target: Option<Url>,
    /// Declared body length, if known.
    pub content_length: Option<u64>,
    /// Whether the reply was served from the shared cache.
    pub from_cache: bool,
}

impl ReplyHead {
    /// A head for `url` with the given status and no headers.
    pub fn new(url: Url, status: u16) -> Self {
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown")
            .to_string();
        Self {
            url,
            status,
            reason,
            headers: http::HeaderMap::new(),
            redirect_target: None,
            content_length: None,
            from_cache: false,
        }
    }

    /// Resolve the redirect target from the status and `Location` header.
    ///
    /// Relative locations are resolved against the reply URL.
    pub fn resolve_redirect(&mut self) {
        self.redirect_target = if (300..400).contains(&self.status) {
            self.header("location")
                .and_then(|location| self.url.join(location).ok())
        } else {
            None
        };
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Check if the status indicates an HTTP-level failure.
    pub fn is_http_error(&self) -> bool {
        self.status >= 400
    }

    /// The transport error description for an HTTP-level failure.
    pub fn error_string(&self) -> Option<String> {
        self.is_http_error().then(|| {
            format!(
                "Error transferring {} - server replied: {}",
                self.url, self.reason
            )
        })
    }
}

/// A live reply: head plus a stream of body chunks.
///
/// Dropping the reply releases the underlying connection.
pub struct TransportReply {
    /// Status line and headers.
    pub head: ReplyHead,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, Result<Bytes>>,
}

impl TransportReply {
    /// A reply whose body is already in memory.
    pub fn from_bytes(head: ReplyHead, body: Bytes) -> Self {
        let chunks = if body.is_empty() { vec![] } else { vec![Ok(body)] };
        Self {
            head,
            body: stream::iter(chunks).boxed(),
        }
    }
}

impl std::fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportReply")
            .field("head", &self.head)
            .finish()
    }
}

/// Progress information for downloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    /// Number of bytes transferred so far.
    pub bytes_transferred: u64,
    /// Total number of bytes, if known.
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// Get the progress as a fraction (0.0 to 1.0), if total is known.
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                1.0
            } else {
                self.bytes_transferred as f64 / total as f64
            }
        })
    }

    /// Get the progress as a percentage (0 to 100), if total is known.
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).min(100.0) as u8)
    }
}
