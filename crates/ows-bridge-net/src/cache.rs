//! Shared response cache and cache metadata annotation.
//!
//! A [`ResponseCache`] is owned outside any single request client and shared
//! through the [`NetworkContext`](crate::NetworkContext). Transports read and
//! write whole entries when a request's cache directives allow it; request
//! clients only touch an entry's [`CacheMetadata`] through
//! [`ResponseCache::metadata`] and [`ResponseCache::update_metadata`].
//!
//! After a successful, non-redirected exchange the client runs
//! [`annotate_metadata`]: the stored `Cache-Control` headers are dropped so the
//! expiration is controlled locally, and an entry without an expiration date
//! gets one `default_expiration` from now.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use ows_bridge_core::logging::targets;

use crate::error::Result;
use crate::fake_endpoint::md5_hex;
use crate::http::ReplyHead;

/// Side-channel information describing a cached response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// The URL the entry is keyed by.
    pub url: Url,
    /// Response headers as stored, in arrival order.
    pub raw_headers: Vec<(String, String)>,
    /// When the entry stops being fresh.
    pub expiration: Option<DateTime<Utc>>,
    /// The `Last-Modified` date reported by the server.
    pub last_modified: Option<DateTime<Utc>>,
}

impl CacheMetadata {
    /// Empty metadata for `url`.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            raw_headers: Vec::new(),
            expiration: None,
            last_modified: None,
        }
    }

    /// Build metadata from a reply head.
    ///
    /// The expiration comes from `Cache-Control: max-age`, falling back to
    /// `Expires`.
    pub fn from_reply(head: &ReplyHead, now: DateTime<Utc>) -> Self {
        let raw_headers = head
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let expiration = head
            .header("cache-control")
            .and_then(max_age)
            .and_then(|secs| now.checked_add_signed(TimeDelta::seconds(secs)))
            .or_else(|| head.header("expires").and_then(parse_http_date));

        Self {
            url: head.url.clone(),
            raw_headers,
            expiration,
            last_modified: head.header("last-modified").and_then(parse_http_date),
        }
    }

    /// Check whether a raw header is present (case-insensitive).
    pub fn has_raw_header(&self, name: &str) -> bool {
        self.raw_headers
            .iter()
            .any(|(header, _)| header.eq_ignore_ascii_case(name))
    }

    /// Check whether the entry is still fresh at `now`.
    ///
    /// Entries without an expiration date are never fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration > now)
    }
}

/// A complete cache entry.
#[derive(Clone, Debug)]
pub struct CachedResponse {
    /// Entry metadata.
    pub metadata: CacheMetadata,
    /// HTTP status of the stored reply.
    pub status: u16,
    /// Stored body.
    pub body: Bytes,
}

/// A response cache shared by every client of a network context.
pub trait ResponseCache: Send + Sync {
    /// Read the metadata stored for `url`.
    fn metadata(&self, url: &Url) -> Option<CacheMetadata>;

    /// Replace the metadata of the entry keyed by `metadata.url`.
    ///
    /// Does nothing when no entry exists for that URL.
    fn update_metadata(&self, metadata: CacheMetadata);

    /// Fetch the whole entry for `url`.
    fn lookup(&self, url: &Url) -> Option<CachedResponse>;

    /// Store an entry, replacing any previous one for the same URL.
    fn insert(&self, response: CachedResponse);

    /// Drop the entry for `url`. Returns `true` if one existed.
    fn remove(&self, url: &Url) -> bool;
}

/// Check whether a reply may be stored.
pub(crate) fn is_storable(head: &ReplyHead) -> bool {
    head.status == 200
        && !head
            .header("cache-control")
            .is_some_and(|value| value.to_ascii_lowercase().contains("no-store"))
}

/// Force locally controlled expiration on the entry for `url`.
///
/// Returns `true` if an entry was found and rewritten.
pub fn annotate_metadata(cache: &dyn ResponseCache, url: &Url, default_expiration: Duration) -> bool {
    let Some(mut metadata) = cache.metadata(url) else {
        tracing::debug!(target: targets::CACHE, %url, "no cache entry to annotate");
        return false;
    };

    metadata
        .raw_headers
        .retain(|(name, _)| !name.eq_ignore_ascii_case("cache-control"));

    tracing::debug!(target: targets::CACHE, %url, expiration = ?metadata.expiration, "annotating cache entry");
    if metadata.expiration.is_none() {
        let now = Utc::now();
        metadata.expiration = Some(
            TimeDelta::from_std(default_expiration)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );
    }

    cache.update_metadata(metadata);
    true
}

fn max_age(cache_control: &str) -> Option<i64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if name.trim().eq_ignore_ascii_case("max-age") {
            value.trim().trim_matches('"').parse().ok()
        } else {
            None
        }
    })
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// An in-memory response cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<Url, CachedResponse>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl ResponseCache for MemoryCache {
    fn metadata(&self, url: &Url) -> Option<CacheMetadata> {
        self.entries.lock().get(url).map(|entry| entry.metadata.clone())
    }

    fn update_metadata(&self, metadata: CacheMetadata) {
        if let Some(entry) = self.entries.lock().get_mut(&metadata.url) {
            entry.metadata = metadata;
        }
    }

    fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        self.entries.lock().get(url).cloned()
    }

    fn insert(&self, response: CachedResponse) {
        self.entries
            .lock()
            .insert(response.metadata.url.clone(), response);
    }

    fn remove(&self, url: &Url) -> bool {
        self.entries.lock().remove(url).is_some()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    metadata: CacheMetadata,
    status: u16,
}

/// A directory-backed response cache.
///
/// Each entry is two files named after the MD5 of its URL: a JSON metadata
/// sidecar and the raw body. I/O failures are logged and treated as misses.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    // Serializes read-modify-write of sidecars.
    lock: Mutex<()>,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Io`](crate::NetworkError::Io) if the directory
    /// cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, url: &Url) -> (PathBuf, PathBuf) {
        let key = md5_hex(url.as_str().as_bytes());
        (
            self.dir.join(format!("{key}.json")),
            self.dir.join(format!("{key}.body")),
        )
    }

    fn read_entry(&self, path: &Path) -> Option<DiskEntry> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(target: targets::CACHE, path = %path.display(), %err, "failed to read cache metadata");
                return None;
            }
        };
        match serde_json::from_slice(&data) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(target: targets::CACHE, path = %path.display(), %err, "corrupt cache metadata");
                None
            }
        }
    }

    fn write_entry(&self, path: &Path, entry: &DiskEntry) -> Result<()> {
        let data = serde_json::to_vec_pretty(entry)?;
        fs::write(path, data)?;
        Ok(())
    }
}

impl ResponseCache for DiskCache {
    fn metadata(&self, url: &Url) -> Option<CacheMetadata> {
        let _guard = self.lock.lock();
        let (meta_path, _) = self.paths(url);
        self.read_entry(&meta_path).map(|entry| entry.metadata)
    }

    fn update_metadata(&self, metadata: CacheMetadata) {
        let _guard = self.lock.lock();
        let (meta_path, _) = self.paths(&metadata.url);
        let Some(mut entry) = self.read_entry(&meta_path) else {
            return;
        };
        entry.metadata = metadata;
        if let Err(err) = self.write_entry(&meta_path, &entry) {
            tracing::warn!(target: targets::CACHE, %err, "failed to update cache metadata");
        }
    }

    fn lookup(&self, url: &Url) -> Option<CachedResponse> {
        let _guard = self.lock.lock();
        let (meta_path, body_path) = self.paths(url);
        let entry = self.read_entry(&meta_path)?;
        match fs::read(&body_path) {
            Ok(body) => Some(CachedResponse {
                metadata: entry.metadata,
                status: entry.status,
                body: Bytes::from(body),
            }),
            Err(err) => {
                tracing::warn!(target: targets::CACHE, %url, %err, "cache body missing");
                None
            }
        }
    }

    fn insert(&self, response: CachedResponse) {
        let _guard = self.lock.lock();
        let (meta_path, body_path) = self.paths(&response.metadata.url);
        let entry = DiskEntry {
            metadata: response.metadata,
            status: response.status,
        };
        let written = fs::write(&body_path, &response.body)
            .map_err(Into::into)
            .and_then(|()| self.write_entry(&meta_path, &entry));
        if let Err(err) = written {
            tracing::warn!(target: targets::CACHE, url = %entry.metadata.url, %err, "failed to store cache entry");
        }
    }

    fn remove(&self, url: &Url) -> bool {
        let _guard = self.lock.lock();
        let (meta_path, body_path) = self.paths(url);
        let existed = fs::remove_file(&meta_path).is_ok();
        let _ = fs::remove_file(&body_path);
        existed
    }
}
