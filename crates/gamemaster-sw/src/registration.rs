//! Registration: the host-side slots (installing, waiting, active) for a
//! scope, and the rules for moving a worker between them.
//!
//! ```text
//! ServiceWorkerRegistration (scope)
//!     ├── installing ── install ok ──→ waiting
//!     ├── waiting ───── skipWaiting or no controlled clients ──→ active
//!     └── active ────── replaced ──→ redundant
//! ```

use std::sync::Arc;
use std::time::Instant;

use gamemaster_net::{Request, Url};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::error::{Result, ServiceWorkerError};
use crate::lifecycle::ActivationReport;
use crate::message::ControlMessage;
use crate::strategy::FetchDisposition;
use crate::worker::ServiceWorker;

/// A service worker registration.
#[derive(Debug)]
pub struct ServiceWorkerRegistration {
    scope: Url,
    clients: Arc<Clients>,
    installing: Option<Arc<ServiceWorker>>,
    waiting: Option<Arc<ServiceWorker>>,
    active: Option<Arc<ServiceWorker>>,
    last_update: Option<Instant>,
}

impl ServiceWorkerRegistration {
    pub fn new(scope: Url, clients: Arc<Clients>) -> Self {
        Self {
            scope,
            clients,
            installing: None,
            waiting: None,
            active: None,
            last_update: None,
        }
    }

    pub fn scope(&self) -> &Url {
        &self.scope
    }

    pub fn installing(&self) -> Option<&Arc<ServiceWorker>> {
        self.installing.as_ref()
    }

    pub fn waiting(&self) -> Option<&Arc<ServiceWorker>> {
        self.waiting.as_ref()
    }

    pub fn active(&self) -> Option<&Arc<ServiceWorker>> {
        self.active.as_ref()
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Install a new version and activate it when allowed.
    ///
    /// Returns the activation report if the new worker became active.
    pub async fn update(&mut self, worker: Arc<ServiceWorker>) -> Result<Option<ActivationReport>> {
        if worker.scope() != &self.scope {
            return Err(ServiceWorkerError::state(format!(
                "worker scope {} does not match registration scope {}",
                worker.scope(),
                self.scope
            )));
        }

        self.last_update = Some(Instant::now());
        self.installing = Some(Arc::clone(&worker));
        let installed = worker.install().await;
        self.installing = None;
        installed?;

        if let Some(previous) = self.waiting.replace(worker) {
            debug!(version = %previous.version(), "Waiting worker replaced");
            previous.make_redundant();
        }

        self.try_activate().await
    }

    /// Activate the waiting worker unless the active one still controls clients
    /// and the waiting one has not asked to skip waiting.
    pub async fn try_activate(&mut self) -> Result<Option<ActivationReport>> {
        let Some(waiting) = self.waiting.as_ref() else {
            return Ok(None);
        };

        let in_use = match self.active.as_ref() {
            Some(active) => self.clients.any_controlled_by(&self.scope, active.id()).await,
            None => false,
        };
        if in_use && !waiting.skip_waiting_requested() {
            debug!(version = %waiting.version(), "Worker waiting for old clients to close");
            return Ok(None);
        }

        self.activate_waiting().await.map(Some)
    }

    /// Activate the waiting worker. The previous active worker keeps its slot
    /// until the new one reports `Activated`; a failed activation leaves it in place.
    async fn activate_waiting(&mut self) -> Result<ActivationReport> {
        let worker = self
            .waiting
            .take()
            .ok_or_else(|| ServiceWorkerError::state("no waiting worker"))?;

        let report = match worker.activate().await {
            Ok(report) => report,
            Err(e) => {
                warn!(version = %worker.version(), error = %e, "Activation failed");
                worker.make_redundant();
                return Err(e);
            }
        };

        if let Some(old) = self.active.replace(Arc::clone(&worker)) {
            info!(old = %old.version(), new = %worker.version(), "Replaced active worker");
            old.make_redundant();
        }
        Ok(report)
    }

    /// A page closed. The waiting worker may now be free to activate.
    pub async fn close_client(&mut self, id: &str) -> Result<Option<ActivationReport>> {
        if self.clients.remove(id).await.is_none() {
            return Ok(None);
        }
        self.try_activate().await
    }

    /// Route a fetch to the active worker; with none, the request passes through.
    pub async fn handle_fetch(&self, request: &Request) -> FetchDisposition {
        match self.active.as_ref() {
            Some(worker) => worker.handle_fetch(request).await,
            None => FetchDisposition::Passthrough,
        }
    }

    /// Deliver a page message. `SKIP_WAITING` received by the waiting worker
    /// activates it immediately.
    pub async fn post_message(&mut self, data: &JsonValue) -> Result<Option<ActivationReport>> {
        if let Some(waiting) = self.waiting.as_ref() {
            if waiting.handle_message(data) == Some(ControlMessage::SkipWaiting) {
                return self.try_activate().await;
            }
            return Ok(None);
        }
        if let Some(active) = self.active.as_ref() {
            active.handle_message(data);
        }
        Ok(None)
    }

    /// Mark every worker redundant and empty the slots.
    pub fn unregister(&mut self) {
        for worker in [
            self.installing.take(),
            self.waiting.take(),
            self.active.take(),
        ]
        .into_iter()
        .flatten()
        {
            worker.make_redundant();
        }
    }

    /// Wait for detached work of the waiting and active workers.
    pub async fn settle(&self) {
        for worker in [self.waiting.as_ref(), self.active.as_ref()]
            .into_iter()
            .flatten()
        {
            worker.settle().await;
        }
    }
}
