//! Cache storage: the host `caches` capability and an in-memory implementation.
//!
//! ```text
//! CacheStorage (caches)
//!     └── Cache (named, e.g. "gamemaster-v6")
//!             └── CacheKey (method + URL) → CacheEntry (response snapshot)
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use gamemaster_net::{Request, Response, Url};
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{Result, ServiceWorkerError};

// ==================== Keys & Entries ====================

/// Request identity used to look up cached responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub method: String,
    /// Absolute URL with the fragment removed.
    pub url: String,
}

impl CacheKey {
    /// Key for an intercepted request.
    pub fn for_request(request: &Request) -> Self {
        let mut url = request.url.clone();
        url.set_fragment(None);
        Self {
            method: request.method.as_str().to_string(),
            url: url.into(),
        }
    }

    /// Key for a plain GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::for_request(&Request::get(url.clone()))
    }
}

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// URL the response was served from.
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Header pairs in their original order; repeated names are kept and
    /// values are stored as raw bytes.
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot `response` for storage under `key`.
    pub fn from_response(key: &CacheKey, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        Self {
            url: response
                .url
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| key.url.clone()),
            status: response.status.as_u16(),
            status_text: response.status_text.clone(),
            headers,
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from this snapshot.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(n, v);
            }
        }

        Response {
            url: Url::parse(&self.url).ok(),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            status_text: self.status_text.clone(),
            headers,
            body: self.body.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Capability ====================

/// Host-provided named cache storage.
///
/// Individual writes are atomic; there is no locking across calls.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a cache, creating it if absent.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all caches, sorted.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Look up `key` in the named cache.
    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or overwrite one entry, creating the cache if needed.
    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<()>;

    /// Insert a batch atomically: either every entry is written or none is.
    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, CacheEntry)>) -> Result<()>;

    /// Request keys stored in the named cache, sorted.
    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>>;
}

// ==================== In-memory implementation ====================

/// A cache instance.
#[derive(Debug, Default)]
pub struct Cache {
    pub name: String,
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    pub fn match_request(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<_> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// [`CacheStorage`] held in process memory.
///
/// An optional per-cache entry quota makes writes fail the way a full
/// browser profile would.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
    max_entries_per_cache: Option<usize>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit each cache to `max_entries`; writes beyond it fail.
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            max_entries_per_cache: Some(max_entries),
        }
    }

    fn check_quota(&self, cache: &Cache, new_keys: &[&CacheKey]) -> Result<()> {
        let Some(max) = self.max_entries_per_cache else {
            return Ok(());
        };
        let added = new_keys
            .iter()
            .filter(|k| cache.match_request(k).is_none())
            .count();
        if cache.len() + added > max {
            return Err(ServiceWorkerError::cache(format!(
                "quota exceeded for '{}' ({} entries max)",
                cache.name, max
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        let mut caches = self.caches.write().await;
        caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.caches.write().await.remove(name).is_some();
        debug!(cache = %name, removed, "Cache deleted");
        Ok(removed)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let caches = self.caches.read().await;
        let hit = caches
            .get(name)
            .and_then(|cache| cache.match_request(key))
            .cloned();
        trace!(cache = %name, url = %key.url, hit = hit.is_some(), "Cache lookup");
        Ok(hit)
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<()> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        self.check_quota(cache, &[&key])?;
        trace!(cache = %name, url = %key.url, "Cache put");
        cache.put(key, entry);
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, CacheEntry)>) -> Result<()> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        let keys: Vec<&CacheKey> = entries.iter().map(|(k, _)| k).collect();
        self.check_quota(cache, &keys)?;
        for (key, entry) in entries {
            cache.put(key, entry);
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        let caches = self.caches.read().await;
        Ok(caches.get(name).map(Cache::keys).unwrap_or_default())
    }
}
