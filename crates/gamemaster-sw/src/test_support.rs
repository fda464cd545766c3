//! Scripted doubles for the network and cache storage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gamemaster_net::{Fetcher, NetError, Request, Response, Url};
use hashbrown::HashMap;
use http::StatusCode;

use crate::cache::{CacheEntry, CacheKey, CacheStorage, MemoryCacheStorage};
use crate::error::{Result, ServiceWorkerError};

#[derive(Clone)]
enum Script {
    Respond(StatusCode, String),
    Fail,
}

/// Serves scripted responses by URL; unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the default manifest under `scope`.
    pub fn serving_defaults(scope: &Url) -> Self {
        let fetcher = Self::new();
        for (path, body) in [
            ("./", "<html>root</html>"),
            ("./index.html", "<html>index</html>"),
            ("./games.json", "[\"chess\"]"),
            ("./manifest.json", "{\"name\":\"GameMaster\"}"),
        ] {
            fetcher.respond(&scope.join(path).unwrap(), StatusCode::OK, body);
        }
        fetcher
    }

    pub fn respond(&self, url: &Url, status: StatusCode, body: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Respond(status, body.to_string()));
    }

    pub fn fail(&self, url: &Url) {
        self.scripts.lock().unwrap().insert(url.to_string(), Script::Fail);
    }

    /// Make every request fail.
    pub fn go_offline(&self) {
        for script in self.scripts.lock().unwrap().values_mut() {
            *script = Script::Fail;
        }
    }

    pub fn calls_to(&self, url: &Url) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url.as_str())
            .count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());
        let script = self.scripts.lock().unwrap().get(&url).cloned();
        match script {
            Some(Script::Respond(status, body)) => {
                Ok(Response::new(status, body).with_url(request.url.clone()))
            }
            Some(Script::Fail) | None => Err(NetError::RequestFailed(format!("{url}: offline"))),
        }
    }
}

/// In-memory storage whose deletes can be switched to fail.
#[derive(Default)]
pub struct FlakyCacheStorage {
    inner: MemoryCacheStorage,
    fail_deletes: AtomicBool,
}

impl FlakyCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for FlakyCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::cache(format!("cannot delete '{name}'")));
        }
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn match_request(&self, name: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.inner.match_request(name, key).await
    }

    async fn put(&self, name: &str, key: CacheKey, entry: CacheEntry) -> Result<()> {
        self.inner.put(name, key, entry).await
    }

    async fn put_all(&self, name: &str, entries: Vec<(CacheKey, CacheEntry)>) -> Result<()> {
        self.inner.put_all(name, entries).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>> {
        self.inner.entries(name).await
    }
}
