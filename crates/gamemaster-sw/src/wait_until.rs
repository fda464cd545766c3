//! Lifetime extension for detached work (`event.waitUntil`).
//!
//! Background revalidation and fire-and-forget cache writes are spawned
//! here. Their errors end at the task boundary: they are logged and
//! dropped, never returned to the request that started them.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::Result;

/// Set of detached tasks the host must keep alive.
#[derive(Debug, Clone, Default)]
pub struct WaitUntil {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl WaitUntil {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `work` as a detached task. Must be called within a Tokio runtime.
    pub fn spawn<F>(&self, label: &'static str, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let mut tasks = self.lock();
        // Reap finished tasks so the set does not grow with traffic.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = work.await {
                debug!(task = label, error = %e, "Detached task failed");
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Wait until every detached task, including ones spawned meanwhile, has finished.
    pub async fn settle(&self) {
        loop {
            let mut batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                return;
            }
            while let Some(joined) = batch.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Detached task panicked");
                }
            }
        }
    }
}
