//! Fetch strategies: network-first for documents, cache-first with
//! background refresh for static assets.

use std::sync::Arc;

use gamemaster_net::{Fetcher, Request, Response};
use http::StatusCode;
use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::error::ServiceWorkerError;
use crate::wait_until::WaitUntil;

/// Where a returned response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    /// Exact match in the current cache.
    Cache,
    /// A different cached document stood in (root document or navigation fallback).
    Fallback,
    /// The synthetic offline response.
    Offline,
}

/// Result of handling an intercepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchDisposition {
    /// Not intercepted; the browser handles the request itself.
    Passthrough,
    Respond {
        response: Response,
        source: ResponseSource,
    },
    /// Intercepted, but nothing could be produced (offline, nothing cached).
    Unresolved,
}

impl FetchDisposition {
    fn respond(response: Response, source: ResponseSource) -> Self {
        Self::Respond { response, source }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Respond { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            Self::Respond { source, .. } => Some(*source),
            _ => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

/// Only a plain 200 is worth keeping; partial and redirect responses are not.
fn is_cacheable(response: &Response) -> bool {
    response.status == StatusCode::OK
}

/// Everything the strategies need, cloned into detached tasks.
#[derive(Clone)]
pub(crate) struct StrategyContext {
    pub caches: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Fetcher>,
    pub tasks: WaitUntil,
    pub cache_name: String,
    pub root_document: CacheKey,
    pub navigation_fallback: CacheKey,
    pub offline_body: String,
}

impl StrategyContext {
    /// Cache lookup where a storage failure reads as a miss.
    async fn lookup(&self, key: &CacheKey) -> Option<Response> {
        match self.caches.match_request(&self.cache_name, key).await {
            Ok(hit) => hit.map(|entry| entry.to_response()),
            Err(e) => {
                debug!(url = %key.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    /// Store a copy of `response` without waiting for the write.
    fn store_detached(&self, key: CacheKey, response: &Response) {
        let entry = CacheEntry::from_response(&key, response);
        let caches = Arc::clone(&self.caches);
        let name = self.cache_name.clone();
        self.tasks.spawn("cache-put", async move {
            caches.put(&name, key, entry).await
        });
    }

    /// Refresh `key` from the network in the background.
    fn revalidate(&self, request: &Request, key: CacheKey) {
        let network = Arc::clone(&self.network);
        let caches = Arc::clone(&self.caches);
        let name = self.cache_name.clone();
        let request = request.clone();
        self.tasks.spawn("revalidate", async move {
            let response = network.fetch(&request).await?;
            if is_cacheable(&response) {
                let entry = CacheEntry::from_response(&key, &response);
                caches.put(&name, key, entry).await?;
                debug!(url = %request.url, "Revalidated cached asset");
            }
            Ok::<(), ServiceWorkerError>(())
        });
    }

    fn offline(&self) -> Response {
        Response::new(StatusCode::SERVICE_UNAVAILABLE, self.offline_body.clone())
            .with_status_text("Service Unavailable")
    }

    /// Network first, then the exact cache entry, then the cached root document.
    pub async fn network_first(&self, request: &Request) -> FetchDisposition {
        let key = CacheKey::for_request(request);

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_detached(key, &response);
                }
                FetchDisposition::respond(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed, trying cache");
                if let Some(cached) = self.lookup(&key).await {
                    return FetchDisposition::respond(cached, ResponseSource::Cache);
                }
                if let Some(root) = self.lookup(&self.root_document).await {
                    return FetchDisposition::respond(root, ResponseSource::Fallback);
                }
                debug!(url = %request.url, "No cached fallback");
                FetchDisposition::Unresolved
            }
        }
    }

    /// Cache first with a background refresh on hits; network on misses.
    pub async fn cache_first(&self, request: &Request) -> FetchDisposition {
        let key = CacheKey::for_request(request);

        if let Some(cached) = self.lookup(&key).await {
            self.revalidate(request, key);
            return FetchDisposition::respond(cached, ResponseSource::Cache);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if is_cacheable(&response) {
                    self.store_detached(key, &response);
                }
                FetchDisposition::respond(response, ResponseSource::Network)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network failed on cache miss");
                if request.is_navigation() {
                    if let Some(page) = self.lookup(&self.navigation_fallback).await {
                        return FetchDisposition::respond(page, ResponseSource::Fallback);
                    }
                }
                FetchDisposition::respond(self.offline(), ResponseSource::Offline)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::test_support::MockFetcher;
    use gamemaster_net::Url;

    const CACHE: &str = "gamemaster-v6";

    fn url(path: &str) -> Url {
        Url::parse("https://app.example/").unwrap().join(path).unwrap()
    }

    fn context(network: &Arc<MockFetcher>, caches: &Arc<MemoryCacheStorage>) -> StrategyContext {
        StrategyContext {
            caches: Arc::clone(caches) as Arc<dyn CacheStorage>,
            network: Arc::clone(network) as Arc<dyn Fetcher>,
            tasks: WaitUntil::new(),
            cache_name: CACHE.to_string(),
            root_document: CacheKey::get(&url("./")),
            navigation_fallback: CacheKey::get(&url("./index.html")),
            offline_body: "Offline".to_string(),
        }
    }

    async fn seed(caches: &MemoryCacheStorage, path: &str, body: &str) {
        let key = CacheKey::get(&url(path));
        let response = Response::new(StatusCode::OK, body.to_string());
        caches
            .put(CACHE, key.clone(), CacheEntry::from_response(&key, &response))
            .await
            .unwrap();
    }

    async fn cached_body(caches: &MemoryCacheStorage, path: &str) -> Option<String> {
        caches
            .match_request(CACHE, &CacheKey::get(&url(path)))
            .await
            .unwrap()
            .map(|e| String::from_utf8_lossy(&e.body).into_owned())
    }

    #[tokio::test]
    async fn test_network_first_success_updates_cache() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        network.respond(&url("games.json"), StatusCode::OK, "[\"go\"]");
        seed(&caches, "games.json", "[\"chess\"]").await;
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("games.json"))).await;
        ctx.tasks.settle().await;

        assert_eq!(result.source(), Some(ResponseSource::Network));
        assert_eq!(result.response().unwrap().text(), "[\"go\"]");
        assert_eq!(cached_body(&caches, "games.json").await.as_deref(), Some("[\"go\"]"));
    }

    #[tokio::test]
    async fn test_network_first_error_status_not_cached() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        network.respond(&url("missing.html"), StatusCode::NOT_FOUND, "nope");
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("missing.html"))).await;
        ctx.tasks.settle().await;

        assert_eq!(result.response().unwrap().status, StatusCode::NOT_FOUND);
        assert!(cached_body(&caches, "missing.html").await.is_none());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_exact_entry() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "games.json", "[\"chess\"]").await;
        seed(&caches, "./", "<html>root</html>").await;
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("games.json"))).await;

        assert_eq!(result.source(), Some(ResponseSource::Cache));
        assert_eq!(result.response().unwrap().text(), "[\"chess\"]");
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_root_document() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "./", "<html>root</html>").await;
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("rules.html"))).await;

        assert_eq!(result.source(), Some(ResponseSource::Fallback));
        assert_eq!(result.response().unwrap().text(), "<html>root</html>");
    }

    #[tokio::test]
    async fn test_network_first_unresolved_when_nothing_cached() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("rules.html"))).await;
        assert_eq!(result, FetchDisposition::Unresolved);
    }

    #[tokio::test]
    async fn test_network_first_ignores_cache_write_failure() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::with_quota(0));
        network.respond(&url("index.html"), StatusCode::OK, "<html>new</html>");
        let ctx = context(&network, &caches);

        let result = ctx.network_first(&Request::get(url("index.html"))).await;
        ctx.tasks.settle().await;

        assert_eq!(result.response().unwrap().text(), "<html>new</html>");
        assert!(cached_body(&caches, "index.html").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_first_hit_serves_stale_then_refreshes() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "app.js", "old()").await;
        network.respond(&url("app.js"), StatusCode::OK, "new()");
        let ctx = context(&network, &caches);

        let result = ctx.cache_first(&Request::get(url("app.js"))).await;
        assert_eq!(result.source(), Some(ResponseSource::Cache));
        assert_eq!(result.response().unwrap().text(), "old()");

        ctx.tasks.settle().await;
        assert_eq!(network.calls_to(&url("app.js")), 1);
        assert_eq!(cached_body(&caches, "app.js").await.as_deref(), Some("new()"));
    }

    #[tokio::test]
    async fn test_cache_first_hit_survives_failed_refresh() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "app.js", "old()").await;
        let ctx = context(&network, &caches);

        let result = ctx.cache_first(&Request::get(url("app.js"))).await;
        ctx.tasks.settle().await;

        assert_eq!(result.response().unwrap().text(), "old()");
        assert_eq!(cached_body(&caches, "app.js").await.as_deref(), Some("old()"));
    }

    #[tokio::test]
    async fn test_cache_first_refresh_skips_error_status() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "app.js", "old()").await;
        network.respond(&url("app.js"), StatusCode::INTERNAL_SERVER_ERROR, "boom");
        let ctx = context(&network, &caches);

        ctx.cache_first(&Request::get(url("app.js"))).await;
        ctx.tasks.settle().await;

        assert_eq!(cached_body(&caches, "app.js").await.as_deref(), Some("old()"));
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        network.respond(&url("style.css"), StatusCode::OK, "body{}");
        let ctx = context(&network, &caches);

        let result = ctx.cache_first(&Request::get(url("style.css"))).await;
        ctx.tasks.settle().await;

        assert_eq!(result.source(), Some(ResponseSource::Network));
        assert_eq!(cached_body(&caches, "style.css").await.as_deref(), Some("body{}"));
        // No extra refresh on the miss path.
        assert_eq!(network.calls_to(&url("style.css")), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_offline_response() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        let ctx = context(&network, &caches);

        let result = ctx.cache_first(&Request::get(url("logo.png"))).await;
        let response = result.response().unwrap();

        assert_eq!(result.source(), Some(ResponseSource::Offline));
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status_text, "Service Unavailable");
        assert_eq!(response.text(), "Offline");
    }

    #[tokio::test]
    async fn test_cache_first_navigation_uses_index_page() {
        let network = Arc::new(MockFetcher::new());
        let caches = Arc::new(MemoryCacheStorage::new());
        seed(&caches, "index.html", "<html>index</html>").await;
        let ctx = context(&network, &caches);

        let result = ctx.cache_first(&Request::navigate(url("play/chess"))).await;

        assert_eq!(result.source(), Some(ResponseSource::Fallback));
        assert_eq!(result.response().unwrap().text(), "<html>index</html>");
    }
}
