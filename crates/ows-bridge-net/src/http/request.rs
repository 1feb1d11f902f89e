//! Outgoing request types.

use bytes::Bytes;
use url::Url;

use crate::error::Result;

/// HTTP request methods issued by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    Get,
    /// HTTP POST method.
    Post,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Where a transport may satisfy a request from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheLoadControl {
    /// Always go to the network, never serve from cache.
    AlwaysNetwork,
    /// Go to the network; the cache is only written.
    #[default]
    PreferNetwork,
    /// Serve a fresh cache entry when one exists.
    PreferCache,
}

/// A request as handed to a [`Transport`](super::Transport).
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The target URL.
    pub url: Url,
    /// Request headers.
    pub headers: http::HeaderMap,
    /// Request body, for POST.
    pub body: Option<Bytes>,
    /// Cache load policy.
    pub cache_load: CacheLoadControl,
    /// Whether the response may be stored in the shared cache.
    pub cache_save: bool,
}

impl TransportRequest {
    /// A GET request with default cache directives.
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            headers: http::HeaderMap::new(),
            body: None,
            cache_load: CacheLoadControl::default(),
            cache_save: false,
        }
    }

    /// A POST request carrying `body` with the given content type.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidHeader`](crate::NetworkError::InvalidHeader)
    /// if `content_type` is not a valid header value.
    pub fn post(url: Url, content_type: &str, body: Bytes) -> Result<Self> {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_str(content_type)?,
        );
        Ok(Self {
            method: HttpMethod::Post,
            url,
            headers,
            body: Some(body),
            cache_load: CacheLoadControl::default(),
            cache_save: false,
        })
    }

    /// Apply the bridge's cache directives: refreshes bypass the cache on
    /// load, every response may be saved.
    pub fn with_cache_directives(mut self, force_refresh: bool) -> Self {
        self.cache_load = if force_refresh {
            CacheLoadControl::AlwaysNetwork
        } else {
            CacheLoadControl::PreferCache
        };
        self.cache_save = true;
        self
    }
}

/// Options for [`OwsRequest::send_get`](crate::OwsRequest::send_get).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestOptions {
    /// Block until the exchange finishes.
    pub synchronous: bool,
    /// Bypass cached responses.
    pub force_refresh: bool,
    /// Attach cache load/save directives.
    pub use_cache: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            synchronous: true,
            force_refresh: false,
            use_cache: true,
        }
    }
}

impl RequestOptions {
    /// Return immediately; completion is reported through signals.
    pub fn asynchronous(mut self) -> Self {
        self.synchronous = false;
        self
    }

    /// Bypass cached responses.
    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Do not attach cache directives.
    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Options for [`OwsRequest::send_post_with`](crate::OwsRequest::send_post_with).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostOptions {
    /// Block until the exchange finishes.
    pub synchronous: bool,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self { synchronous: true }
    }
}

impl PostOptions {
    /// Return immediately; completion is reported through signals.
    pub fn asynchronous(mut self) -> Self {
        self.synchronous = false;
        self
    }
}
