//! Request authorization and credential prompts.
//!
//! Two collaborators cover authentication:
//!
//! - An [`Authorizer`] decorates every outgoing request and every live reply.
//!   A failure at either step ends the exchange with a network error.
//! - A [`CredentialProvider`] answers server challenges (401/407). It is
//!   always invoked on the network context's owning thread, where it may
//!   block on user interaction.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::error::{NetworkError, Result};
use crate::http::{ReplyHead, TransportRequest};

/// Decorates outgoing requests and live replies with authorization.
pub trait Authorizer: Send + Sync {
    /// Add authorization to an outgoing request.
    ///
    /// # Errors
    ///
    /// An error aborts the call before any transport is created.
    fn authorize_request(&self, request: &mut TransportRequest) -> Result<()>;

    /// Inspect or adjust a live reply, for schemes that need one.
    ///
    /// # Errors
    ///
    /// An error ends the exchange.
    fn authorize_reply(&self, _reply: &mut ReplyHead) -> Result<()> {
        Ok(())
    }
}

/// An authorizer that leaves requests untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuth;

impl Authorizer for NoAuth {
    fn authorize_request(&self, _request: &mut TransportRequest) -> Result<()> {
        Ok(())
    }
}

/// Static credentials for HTTP requests.
#[derive(Clone, Debug)]
pub enum Authentication {
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password (optional).
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer(String),
}

impl Authentication {
    /// The `Authorization` header value for these credentials.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::InvalidHeader`] if the value cannot be
    /// expressed as a header.
    pub fn header_value(&self) -> Result<http::HeaderValue> {
        let raw = match self {
            Self::Basic { username, password } => {
                let pair = format!("{username}:{}", password.as_deref().unwrap_or_default());
                format!("Basic {}", STANDARD.encode(pair))
            }
            Self::Bearer(token) => format!("Bearer {token}"),
        };
        let mut value = http::HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl Authorizer for Authentication {
    fn authorize_request(&self, request: &mut TransportRequest) -> Result<()> {
        let value = self
            .header_value()
            .map_err(|err| NetworkError::Authentication(err.to_string()))?;
        request.headers.insert(http::header::AUTHORIZATION, value);
        Ok(())
    }
}

/// A challenge raised by a server or proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The URL that was challenged.
    pub url: Url,
    /// The realm, when the challenge names one.
    pub realm: Option<String>,
    /// Whether a proxy raised the challenge.
    pub proxy: bool,
}

impl AuthChallenge {
    /// Build a challenge from a 401/407 reply head.
    pub fn from_reply(head: &ReplyHead) -> Self {
        let proxy = head.status == 407;
        let header = if proxy {
            "proxy-authenticate"
        } else {
            "www-authenticate"
        };
        Self {
            url: head.url.clone(),
            realm: head.header(header).and_then(parse_realm),
            proxy,
        }
    }
}

fn parse_realm(challenge: &str) -> Option<String> {
    let start = challenge.find("realm=")? + "realm=".len();
    let rest = &challenge[start..];
    let realm = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next()?,
        None => rest.split(',').next()?.trim(),
    };
    Some(realm.to_string())
}

/// User-supplied credentials answering a challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    pub(crate) fn authentication(&self) -> Authentication {
        Authentication::Basic {
            username: self.username.clone(),
            password: Some(self.password.clone()),
        }
    }
}

/// Answers authentication challenges on the owning thread.
pub trait CredentialProvider: Send + Sync {
    /// Supply credentials for `challenge`, or `None` to give up.
    fn credentials(&self, challenge: &AuthChallenge) -> Option<Credentials>;
}

impl<F> CredentialProvider for F
where
    F: Fn(&AuthChallenge) -> Option<Credentials> + Send + Sync,
{
    fn credentials(&self, challenge: &AuthChallenge) -> Option<Credentials> {
        self(challenge)
    }
}
