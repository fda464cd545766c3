//! Clients API: open pages of the app and the channel each one listens on.

use std::sync::atomic::{AtomicU64, Ordering};

use gamemaster_net::Url;
use hashbrown::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::error::{Result, ServiceWorkerError};
use crate::message::ClientMessage;
use crate::ServiceWorkerId;

/// A client (an open page of the app).
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    /// Worker currently controlling this client.
    pub controller: Option<ServiceWorkerId>,
    sender: mpsc::UnboundedSender<ClientMessage>,
}

impl Client {
    /// Post message to client.
    pub fn post_message(&self, message: ClientMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ServiceWorkerError::Client(format!("client {} is gone", self.id)))
    }

    pub fn is_controlled(&self) -> bool {
        self.controller.is_some()
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
}

/// Registry of open clients, shared by every worker version.
#[derive(Debug, Default)]
pub struct Clients {
    clients: RwLock<HashMap<String, Client>>,
}

impl Clients {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened window. Messages posted to it arrive on the
    /// returned receiver.
    pub async fn connect(&self, url: Url) -> (Client, mpsc::UnboundedReceiver<ClientMessage>) {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Client {
            id: format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed)),
            url,
            controller: None,
            sender,
        };
        debug!(client = %client.id, url = %client.url, "Client connected");
        self.clients
            .write()
            .await
            .insert(client.id.clone(), client.clone());
        (client, receiver)
    }

    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Forget a closed page.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        let removed = self.clients.write().await.remove(id);
        if removed.is_some() {
            debug!(client = %id, "Client closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Clients within `scope`, sorted by id.
    pub async fn match_all(&self, scope: &Url, options: ClientMatchOptions) -> Vec<Client> {
        let clients = self.clients.read().await;
        let mut matched: Vec<Client> = clients
            .values()
            .filter(|c| in_scope(scope, &c.url))
            .filter(|c| options.include_uncontrolled || c.is_controlled())
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Make `worker` the controller of every client in `scope`.
    pub async fn claim(&self, scope: &Url, worker: ServiceWorkerId) -> usize {
        let mut clients = self.clients.write().await;
        let mut claimed = 0;
        for client in clients.values_mut().filter(|c| in_scope(scope, &c.url)) {
            client.controller = Some(worker);
            claimed += 1;
        }
        debug!(scope = %scope, claimed, "Clients claimed");
        claimed
    }

    /// Whether any client in `scope` is still controlled by `worker`.
    pub async fn any_controlled_by(&self, scope: &Url, worker: ServiceWorkerId) -> bool {
        self.clients
            .read()
            .await
            .values()
            .any(|c| in_scope(scope, &c.url) && c.controller == Some(worker))
    }

    /// Post `message` to every controlled client in `scope`.
    ///
    /// Best effort: a closed client is logged and skipped. Returns the number
    /// of clients the message was handed to.
    pub async fn broadcast(&self, scope: &Url, message: &ClientMessage) -> usize {
        let targets = self.match_all(scope, ClientMatchOptions::default()).await;
        let mut delivered = 0;
        for client in targets {
            match client.post_message(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(client = %client.id, error = %e, "Dropping message"),
            }
        }
        delivered
    }
}

fn in_scope(scope: &Url, url: &Url) -> bool {
    url.origin() == scope.origin() && url.path().starts_with(scope.path())
}
