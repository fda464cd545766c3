//! Worker lifecycle: states, install-time precaching, and activate-time pruning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::future::try_join_all;
use gamemaster_net::{Fetcher, Request, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheKey, CacheStorage};
use crate::error::{Result, ServiceWorkerError};

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ServiceWorkerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkerState {
    /// Created, install not started.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

impl ServiceWorkerState {
    /// Only an activated worker handles fetches.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ServiceWorkerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceWorkerState::Redundant)
    }
}

/// State plus the time it was entered.
#[derive(Debug, Clone, Copy)]
pub struct StateRecord {
    pub state: ServiceWorkerState,
    pub changed_at: Instant,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            state: ServiceWorkerState::Parsed,
            changed_at: Instant::now(),
        }
    }
}

impl StateRecord {
    pub fn set(&mut self, state: ServiceWorkerState) {
        debug!(
            from = ?self.state,
            to = ?state,
            held_ms = self.changed_at.elapsed().as_millis() as u64,
            "Worker state changed"
        );
        self.state = state;
        self.changed_at = Instant::now();
    }

    /// Move from `from` to `to`, failing if the current state is not `from`.
    pub fn transition(&mut self, from: ServiceWorkerState, to: ServiceWorkerState) -> Result<()> {
        if self.state != from {
            return Err(ServiceWorkerError::state(format!(
                "cannot move to {to:?} from {:?} (expected {from:?})",
                self.state
            )));
        }
        self.set(to);
        Ok(())
    }
}

/// Outcome of a completed activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub cache_name: String,
    pub deleted_caches: Vec<String>,
    pub claimed_clients: usize,
    pub notified_clients: usize,
}

/// Fetch every asset and store them as one batch in `cache_name`.
///
/// All-or-nothing: a transport error or a non-2xx status for any asset
/// fails the whole install and nothing is written.
pub async fn precache(
    caches: &dyn CacheStorage,
    network: &dyn Fetcher,
    cache_name: &str,
    scope: &Url,
    assets: &[String],
) -> Result<Vec<CacheKey>> {
    caches.open(cache_name).await?;
    info!(cache = %cache_name, count = assets.len(), "Caching static assets");

    let requests = assets
        .iter()
        .map(|asset| -> Result<Request> { Ok(Request::get(scope.join(asset)?)) })
        .collect::<Result<Vec<_>>>()?;

    let fetches = requests.iter().map(|request| async move {
        let response = network
            .fetch(request)
            .await
            .map_err(|e| ServiceWorkerError::install_failed(request.url.as_str(), e))?;
        if !response.ok() {
            return Err(ServiceWorkerError::install_failed(
                request.url.as_str(),
                response.status,
            ));
        }
        let key = CacheKey::for_request(request);
        let entry = CacheEntry::from_response(&key, &response);
        Ok::<_, ServiceWorkerError>((key, entry))
    });

    let entries = try_join_all(fetches).await?;
    let keys = entries.iter().map(|(k, _)| k.clone()).collect();
    caches.put_all(cache_name, entries).await?;
    debug!(cache = %cache_name, "Static assets cached");
    Ok(keys)
}

/// Delete every cache except `keep`. Returns the deleted names.
pub async fn prune_caches(caches: &dyn CacheStorage, keep: &str) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for name in caches.keys().await? {
        if name == keep {
            continue;
        }
        info!(cache = %name, "Deleting old cache");
        if caches.delete(&name).await? {
            deleted.push(name);
        }
    }
    Ok(deleted)
}
