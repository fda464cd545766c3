//! # GameMaster Offline Worker
//!
//! The service worker that keeps the GameMaster web app usable offline.
//!
//! ## Features
//!
//! - **Install**: precache the app shell into `gamemaster-v<version>`
//! - **Activate**: delete every other cache, claim open pages, announce the version
//! - **Fetch**: network-first for documents and data, cache-first with
//!   background refresh for everything else
//! - **Messages**: `SKIP_WAITING` activates a waiting version immediately
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerRegistration (scope)
//!     ├── waiting (ServiceWorker)
//!     └── active (ServiceWorker)
//!             ├── FetchRouter ──→ network_first / cache_first
//!             ├── CacheStorage (host capability)
//!             ├── Fetcher      (host capability)
//!             └── Clients      (open pages)
//! ```

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod registration;
pub mod router;
pub mod strategy;
pub mod wait_until;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheEntry, CacheKey, CacheStorage, MemoryCacheStorage};
pub use clients::{Client, ClientMatchOptions, Clients};
pub use config::WorkerConfig;
pub use error::{Result, ServiceWorkerError};
pub use lifecycle::{ActivationReport, ServiceWorkerId, ServiceWorkerState};
pub use message::{ClientMessage, ControlMessage};
pub use registration::ServiceWorkerRegistration;
pub use router::{FetchRouter, PassthroughReason, ResourceClass, Route};
pub use strategy::{FetchDisposition, ResponseSource};
pub use wait_until::WaitUntil;
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent};
