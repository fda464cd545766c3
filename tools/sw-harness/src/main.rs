//! Harness for the GameMaster offline worker.
//!
//! Installs and activates the worker against a live origin, replays a few
//! fetches through it, and prints what happened as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Install, activate, then fetch two paths
//! sw-harness run --origin http://localhost:8080/ --path index.html --path logo.png
//!
//! # Print the default configuration
//! sw-harness config > worker.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gamemaster_common::{init_logging, ErrorCategory, LogConfig, LogFormat};
use gamemaster_net::{Fetcher, HttpFetcher, LoaderConfig, Request, Url};
use gamemaster_sw::{
    ActivationReport, CacheStorage, Clients, FetchDisposition, MemoryCacheStorage,
    ServiceWorker, ServiceWorkerError, ServiceWorkerRegistration, WorkerConfig,
};
use serde::Serialize;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sw-harness")]
#[command(about = "Drive the GameMaster offline worker against a live origin")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the worker, then fetch paths through it
    Run {
        /// Origin (and scope) the app is served from
        #[arg(short, long)]
        origin: Url,
        /// Worker configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Paths to fetch after activation, relative to the origin
        #[arg(short, long = "path")]
        paths: Vec<String>,
        /// Treat fetched paths as navigations
        #[arg(long)]
        navigate: bool,
        /// Log output format (pretty, compact, json)
        #[arg(long, default_value = "pretty")]
        log_format: LogFormat,
        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the default worker configuration
    Config,
}

/// Everything `run` observed.
#[derive(Debug, Serialize)]
struct HarnessReport {
    origin: String,
    version: String,
    activation: Option<ActivationReport>,
    caches: Vec<CacheReport>,
    fetches: Vec<FetchReport>,
}

#[derive(Debug, Serialize)]
struct CacheReport {
    name: String,
    entries: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FetchReport {
    path: String,
    url: String,
    outcome: &'static str,
    source: Option<String>,
    status: Option<u16>,
    bytes: Option<usize>,
}

impl FetchReport {
    fn new(path: &str, url: &Url, disposition: &FetchDisposition) -> Self {
        let outcome = match disposition {
            FetchDisposition::Passthrough => "passthrough",
            FetchDisposition::Respond { .. } => "respond",
            FetchDisposition::Unresolved => "unresolved",
        };
        let response = disposition.response();
        Self {
            path: path.to_string(),
            url: url.to_string(),
            outcome,
            source: disposition
                .source()
                .map(|s| format!("{s:?}").to_ascii_lowercase()),
            status: response.map(|r| r.status.as_u16()),
            bytes: response.map(|r| r.body.len()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            origin,
            config,
            paths,
            navigate,
            log_format,
            verbose,
        } => {
            let log = if verbose {
                LogConfig::debug()
            } else {
                LogConfig::default()
            };
            init_logging(log.with_format(log_format));

            match run(origin, config.as_deref(), &paths, navigate).await {
                Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                Err(e) => {
                    error!(
                        category = e.category(),
                        retryable = e.is_retryable(),
                        error = %e,
                        "Harness run failed"
                    );
                    return Err(e.into());
                }
            }
        }

        Commands::Config => {
            println!("{}", WorkerConfig::default().to_json_pretty()?);
        }
    }

    Ok(())
}

async fn run(
    scope: Url,
    config: Option<&Path>,
    paths: &[String],
    navigate: bool,
) -> Result<HarnessReport, ServiceWorkerError> {
    let config = match config {
        Some(path) => WorkerConfig::load(path)?,
        None => WorkerConfig::default(),
    };
    let caches = Arc::new(MemoryCacheStorage::new());
    let network = Arc::new(HttpFetcher::new(LoaderConfig::default())?);
    let clients = Arc::new(Clients::new());
    let version = config.version.clone();

    let worker = ServiceWorker::new(
        scope.clone(),
        config,
        Arc::clone(&caches) as Arc<dyn CacheStorage>,
        network as Arc<dyn Fetcher>,
        Arc::clone(&clients),
    )?;

    // One open page so activation has someone to claim and notify.
    let (_page, mut inbox) = clients.connect(scope.clone()).await;

    let mut registration = ServiceWorkerRegistration::new(scope.clone(), clients);
    let activation = registration.update(Arc::new(worker)).await?;
    while let Ok(message) = inbox.try_recv() {
        info!(message = %message.to_value(), "Page received message");
    }

    let mut fetches = Vec::with_capacity(paths.len());
    for path in paths {
        let url = scope.join(path)?;
        let request = if navigate {
            Request::navigate(url.clone())
        } else {
            Request::get(url.clone())
        };
        let disposition = registration.handle_fetch(&request).await;
        fetches.push(FetchReport::new(path, &url, &disposition));
    }
    registration.settle().await;

    let mut cache_reports = Vec::new();
    for name in caches.keys().await? {
        let entries = caches
            .entries(&name)
            .await?
            .into_iter()
            .map(|key| key.url)
            .collect();
        cache_reports.push(CacheReport { name, entries });
    }

    Ok(HarnessReport {
        origin: scope.to_string(),
        version,
        activation,
        caches: cache_reports,
        fetches,
    })
}
