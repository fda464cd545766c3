//! Fetch routing: which requests the worker handles, and with which strategy.

use gamemaster_net::{Request, Url, UrlPatternSet};
use http::Method;
use tracing::trace;
use url::Origin;

use crate::config::WorkerConfig;

/// Why a request is left to the browser's default handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassthroughReason {
    /// Different origin than the app.
    CrossOrigin,
    /// URL contains a bypassed host substring.
    Bypassed,
    /// Not a GET; the cache cannot hold it.
    Method,
}

/// Resource class of a same-origin request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Markup and data files, plus the app root.
    Document,
    /// Everything else (scripts, styles, images, ...).
    Static,
}

/// Routing decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Passthrough(PassthroughReason),
    NetworkFirst,
    CacheFirst,
}

impl Route {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Route::Passthrough(_))
    }
}

/// Classifies intercepted requests.
#[derive(Debug, Clone)]
pub struct FetchRouter {
    origin: Origin,
    scope_path: String,
    bypass: UrlPatternSet,
    documents: UrlPatternSet,
}

impl FetchRouter {
    pub fn new(scope: &Url, config: &WorkerConfig) -> Self {
        Self {
            origin: scope.origin(),
            scope_path: scope.path().to_string(),
            bypass: config.bypass_patterns(),
            documents: config.document_patterns(),
        }
    }

    pub fn route(&self, request: &Request) -> Route {
        let url = &request.url;
        let route = if url.origin() != self.origin {
            Route::Passthrough(PassthroughReason::CrossOrigin)
        } else if self.bypass.matches(url) {
            Route::Passthrough(PassthroughReason::Bypassed)
        } else if request.method != Method::GET {
            Route::Passthrough(PassthroughReason::Method)
        } else {
            match self.classify(url) {
                ResourceClass::Document => Route::NetworkFirst,
                ResourceClass::Static => Route::CacheFirst,
            }
        };
        trace!(url = %url, route = ?route, "Request routed");
        route
    }

    pub fn classify(&self, url: &Url) -> ResourceClass {
        let path = url.path();
        if path == "/" || path == self.scope_path {
            return ResourceClass::Document;
        }
        if self.documents.matches_str(&path.to_ascii_lowercase()) {
            ResourceClass::Document
        } else {
            ResourceClass::Static
        }
    }
}
