//! `reqwest` client construction from a [`NetworkConfig`].

use reqwest::redirect::Policy;

use crate::context::NetworkConfig;
use crate::error::{NetworkError, Result};

/// Build the HTTP client used by [`DefaultTransport`](super::DefaultTransport).
///
/// Redirects are never followed by the client itself: the request bridge
/// needs to see every hop to detect loops and re-authorize. Stall detection
/// is done per exchange, so no overall request timeout is set here.
pub(crate) fn build_client(config: &NetworkConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().redirect(Policy::none());

    if let Some(connect_timeout) = config.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }

    if config.cookies_enabled {
        builder = builder.cookie_store(true);
    }

    if let Some(ref ua) = config.user_agent {
        builder = builder.user_agent(ua);
    }

    if let Some(ref proxy_url) = config.proxy {
        let proxy =
            reqwest::Proxy::all(proxy_url).map_err(|e| NetworkError::Proxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}
