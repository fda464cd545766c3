//! The offline worker: one deployed version handling lifecycle, fetch and
//! message events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use gamemaster_net::{Fetcher, Request, Url};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStorage};
use crate::clients::Clients;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::lifecycle::{
    precache, prune_caches, ActivationReport, ServiceWorkerId, ServiceWorkerState, StateRecord,
};
use crate::message::{ClientMessage, ControlMessage};
use crate::router::{FetchRouter, Route};
use crate::strategy::{FetchDisposition, StrategyContext};
use crate::wait_until::WaitUntil;

/// Events delivered by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(JsonValue),
}

/// Result of dispatching a [`WorkerEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed,
    Activated(ActivationReport),
    Fetch(FetchDisposition),
    Message(Option<ControlMessage>),
}

/// One deployed version of the worker.
pub struct ServiceWorker {
    id: ServiceWorkerId,
    scope: Url,
    config: Arc<WorkerConfig>,
    caches: Arc<dyn CacheStorage>,
    network: Arc<dyn Fetcher>,
    clients: Arc<Clients>,
    router: FetchRouter,
    strategies: StrategyContext,
    state: RwLock<StateRecord>,
    skip_waiting: AtomicBool,
    tasks: WaitUntil,
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("scope", &self.scope.as_str())
            .field("version", &self.config.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ServiceWorker {
    /// Create a worker for `scope` with the host capabilities it will use.
    pub fn new(
        scope: Url,
        config: WorkerConfig,
        caches: Arc<dyn CacheStorage>,
        network: Arc<dyn Fetcher>,
        clients: Arc<Clients>,
    ) -> Result<Self> {
        config.validate()?;

        let tasks = WaitUntil::new();
        let strategies = StrategyContext {
            caches: Arc::clone(&caches),
            network: Arc::clone(&network),
            tasks: tasks.clone(),
            cache_name: config.cache_name(),
            root_document: CacheKey::get(&scope.join(&config.root_document)?),
            navigation_fallback: CacheKey::get(&scope.join(&config.navigation_fallback)?),
            offline_body: config.offline_body.clone(),
        };

        Ok(Self {
            id: ServiceWorkerId::new(),
            router: FetchRouter::new(&scope, &config),
            scope,
            config: Arc::new(config),
            caches,
            network,
            clients,
            strategies,
            state: RwLock::new(StateRecord::default()),
            skip_waiting: AtomicBool::new(false),
            tasks,
        })
    }

    pub fn id(&self) -> ServiceWorkerId {
        self.id
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn cache_name(&self) -> &str {
        &self.strategies.cache_name
    }

    pub fn state(&self) -> ServiceWorkerState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    fn set_state(&self, state: ServiceWorkerState) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(state);
    }

    fn transition(&self, from: ServiceWorkerState, to: ServiceWorkerState) -> Result<()> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .transition(from, to)
    }

    pub fn is_active(&self) -> bool {
        self.state() == ServiceWorkerState::Activated
    }

    /// Ask the host to activate this worker without waiting for old clients.
    pub fn skip_waiting(&self) {
        debug!(worker = self.id.raw(), "skipWaiting requested");
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// Mark the worker as replaced.
    pub fn make_redundant(&self) {
        self.set_state(ServiceWorkerState::Redundant);
    }

    /// Wait for all detached work (background refreshes, cache writes).
    pub async fn settle(&self) {
        self.tasks.settle().await;
    }

    // ==================== Events ====================

    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.install().await.map(|_| EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => {
                Ok(EventOutcome::Fetch(self.handle_fetch(&request).await))
            }
            WorkerEvent::Message(data) => Ok(EventOutcome::Message(self.handle_message(&data))),
        }
    }

    /// Install: precache the static assets into this version's cache.
    ///
    /// Any failed asset fails the install and leaves the worker redundant.
    pub async fn install(&self) -> Result<Vec<CacheKey>> {
        self.transition(ServiceWorkerState::Parsed, ServiceWorkerState::Installing)?;
        info!(version = %self.config.version, cache = %self.cache_name(), "Installing worker");

        let result = precache(
            self.caches.as_ref(),
            self.network.as_ref(),
            self.cache_name(),
            &self.scope,
            &self.config.static_assets,
        )
        .await;

        match result {
            Ok(keys) => {
                self.set_state(ServiceWorkerState::Installed);
                if self.config.skip_waiting_on_install {
                    self.skip_waiting();
                }
                Ok(keys)
            }
            Err(e) => {
                warn!(version = %self.config.version, error = %e, "Install failed");
                self.set_state(ServiceWorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Activate: prune old caches, claim clients, then notify them.
    ///
    /// The steps run strictly in order and a failing step stops the rest.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.transition(ServiceWorkerState::Installed, ServiceWorkerState::Activating)?;
        info!(version = %self.config.version, "Activating worker");

        let deleted_caches = prune_caches(self.caches.as_ref(), self.cache_name()).await?;
        let claimed_clients = self.clients.claim(&self.scope, self.id).await;
        self.set_state(ServiceWorkerState::Activated);

        let notified_clients = self
            .clients
            .broadcast(&self.scope, &ClientMessage::updated(self.version()))
            .await;
        info!(
            version = %self.config.version,
            deleted = deleted_caches.len(),
            notified = notified_clients,
            "Worker activated"
        );

        Ok(ActivationReport {
            cache_name: self.cache_name().to_string(),
            deleted_caches,
            claimed_clients,
            notified_clients,
        })
    }

    /// Route an intercepted request and run its strategy.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDisposition {
        if !self.state().can_intercept_fetch() {
            debug!(url = %request.url, state = ?self.state(), "Worker not active, passing through");
            return FetchDisposition::Passthrough;
        }

        match self.router.route(request) {
            Route::Passthrough(reason) => {
                debug!(url = %request.url, ?reason, "Not intercepted");
                FetchDisposition::Passthrough
            }
            Route::NetworkFirst => self.strategies.network_first(request).await,
            Route::CacheFirst => self.strategies.cache_first(request).await,
        }
    }

    /// Handle a message posted by a page. Only `SKIP_WAITING` has an effect.
    pub fn handle_message(&self, data: &JsonValue) -> Option<ControlMessage> {
        match ControlMessage::from_value(data) {
            Some(ControlMessage::SkipWaiting) => {
                self.skip_waiting();
                Some(ControlMessage::SkipWaiting)
            }
            None => {
                debug!(%data, "Ignoring message");
                None
            }
        }
    }
}
