//! Local-file substitution for test fixtures.
//!
//! A URL containing [`FAKE_ENDPOINT_MARKER`] is never sent over the network.
//! It is laundered into a local file path instead, so test suites can serve
//! protocol responses from files on disk. The laundering rule is relied upon
//! by existing fixture trees and must stay byte-for-byte stable:
//!
//! 1. percent-decode the URL,
//! 2. drop the first seven characters, the length of `http://`, whatever
//!    the scheme (so `https://host` keeps a leading `/`),
//! 3. take the query part, starting at the first `?`; without a `?` the
//!    query part is the whole remaining string,
//! 4. if the remaining string is longer than 256 UTF-16 units, replace the
//!    query part with the lowercase hex MD5 of itself; otherwise replace each
//!    of `? & < > ' " space : / newline` in it with `_`,
//! 5. append the query part to the path part, which is the whole remaining
//!    string when there is no `?`.
//!
//! ```
//! use ows_bridge_net::fake_endpoint::launder_url;
//!
//! assert_eq!(
//!     launder_url("http://fake_qgis_http_endpoint/service?REQUEST=GetCapabilities"),
//!     "fake_qgis_http_endpoint/service_REQUEST=GetCapabilities",
//! );
//! ```

use std::path::PathBuf;

use md5::{Digest, Md5};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::error::{NetworkError, Result};

/// Substring that switches a request to local-file substitution.
pub const FAKE_ENDPOINT_MARKER: &str = "fake_qgis_http_endpoint";

/// Characters dropped from the front of the decoded URL.
const SCHEME_PREFIX_LEN: usize = "http://".len();

/// Laundered URLs longer than this have their query part hashed.
const MAX_LAUNDERED_LEN: usize = 256;

/// Characters replaced by `_` in a short query part.
const REPLACED_CHARS: [char; 10] = ['?', '&', '<', '>', '\'', '"', ' ', ':', '/', '\n'];

/// Characters escaped when folding a POST body into the query.
const POSTDATA_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>');

/// Check whether `url` targets the fake endpoint.
pub fn is_fake_endpoint(url: &str) -> bool {
    url.contains(FAKE_ENDPOINT_MARKER)
}

/// Launder a fake-endpoint URL into a local file path string.
pub fn launder_url(url: &str) -> String {
    let decoded = percent_decode_str(url).decode_utf8_lossy();
    let stripped = decoded
        .char_indices()
        .nth(SCHEME_PREFIX_LEN)
        .map_or("", |(pos, _)| &decoded[pos..]);

    let (path, query) = match stripped.find('?') {
        Some(query_start) => stripped.split_at(query_start),
        None => (stripped, stripped),
    };

    let args = if stripped.encode_utf16().count() > MAX_LAUNDERED_LEN {
        md5_hex(query.as_bytes())
    } else {
        query.replace(REPLACED_CHARS, "_")
    };

    restore_drive_colon(format!("{path}{args}"))
}

/// Launder `url` and turn it into a `file://` URL.
///
/// Relative paths are resolved against the current directory.
///
/// # Errors
///
/// Returns [`NetworkError::Io`] if the current directory is unavailable, or
/// [`NetworkError::InvalidUrl`] if the path cannot be expressed as a URL.
pub fn local_file_url(url: &str) -> Result<Url> {
    let mut path = PathBuf::from(launder_url(url));
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }
    Url::from_file_path(&path)
        .map_err(|()| NetworkError::InvalidUrl(format!("not a file path: {}", path.display())))
}

/// Fold a POST body into the query string as a `POSTDATA` item.
pub fn with_post_data(url: &str, body: &[u8]) -> String {
    let data = String::from_utf8_lossy(body);
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}POSTDATA={}",
        utf8_percent_encode(&data, POSTDATA_SET)
    )
}

/// Lowercase hex MD5 digest.
pub(crate) fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

// "http://c:/path" loses the drive colon once the scheme is dropped.
#[cfg(windows)]
fn restore_drive_colon(laundered: String) -> String {
    let mut chars = laundered.chars();
    match (chars.next(), chars.next()) {
        (Some(drive), Some('/')) => format!("{drive}:/{}", &laundered[drive.len_utf8() + 1..]),
        _ => laundered,
    }
}

#[cfg(not(windows))]
fn restore_drive_colon(laundered: String) -> String {
    laundered
}
