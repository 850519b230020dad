//! Command-line probe for the pwakit worker.
//!
//! ## Usage
//!
//! ```bash
//! # Which strategy would handle a request?
//! sw-probe route https://ggenre.example/static/css/app.css
//! sw-probe route https://ggenre.example/content/list/ --navigate
//!
//! # Install + activate against the live origin, save the caches
//! sw-probe warm --config pwa.json --out caches.json
//!
//! # List what a snapshot holds
//! sw-probe inspect caches.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use http::Method;
use pwakit_common::{init_logging, LogConfig, LogFormat};
use pwakit_core::PwaConfig;
use pwakit_net::{HttpFetcher, LoaderConfig, Request};
use pwakit_sw::{CacheStorage, Router, ServiceWorkerContainer, StorageSnapshot};
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "sw-probe")]
#[command(about = "Inspect the pwakit offline cache manager")]
struct Cli {
    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the route a request would take
    Route {
        /// Absolute request URL
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Worker config (JSON); defaults use the URL's origin
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run install and activate against the live origin
    Warm {
        /// Worker config (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Snapshot to update
        #[arg(short, long, default_value = "pwa-caches.json")]
        out: PathBuf,
    },

    /// List caches and entries of a saved snapshot
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(
        LogConfig::default()
            .with_filter(cli.log.as_str())
            .with_format(LogFormat::Compact),
    );

    match cli.command {
        Commands::Route {
            url,
            navigate,
            method,
            config,
        } => route(&url, navigate, &method, config.as_deref()),
        Commands::Warm { config, out } => warm(&config, &out).await,
        Commands::Inspect { snapshot } => inspect(&snapshot).await,
    }
}

fn route(url: &str, navigate: bool, method: &str, config: Option<&Path>) -> anyhow::Result<()> {
    let url = Url::parse(url).with_context(|| format!("invalid URL {url}"))?;
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("invalid method {method}"))?;

    let config = match config {
        Some(path) => PwaConfig::from_file(path)?,
        None => PwaConfig {
            origin: url.origin().ascii_serialization(),
            ..Default::default()
        },
    };

    let mut request = Request::get(url).method(method);
    if navigate {
        request = request.mode(pwakit_net::RequestMode::Navigate);
    }

    let router = Router::new(&config)?;
    let route = router.route(&request);
    println!("{} {}", request.method, request.url);
    println!("  route: {route}");
    if let pwakit_sw::Route::NetworkFirst { cache, .. }
    | pwakit_sw::Route::StaleWhileRevalidate { cache } = route
    {
        println!("  cache: {}", config.cache_name(cache));
    }
    Ok(())
}

async fn warm(config_path: &Path, out: &Path) -> anyhow::Result<()> {
    let config = PwaConfig::from_file(config_path)?;
    let scope = config.origin_url()?;

    let storage = if out.exists() {
        CacheStorage::from_snapshot(StorageSnapshot::load(out).await?)
    } else {
        CacheStorage::new()
    };
    let caches = storage.shared();

    let fetcher = Arc::new(HttpFetcher::new(LoaderConfig::default())?);
    let (container, _events) = ServiceWorkerContainer::new(scope, fetcher, Arc::clone(&caches));

    let version = config.cache_version.clone();
    let report = container.register(config).await?;
    if !report.succeeded() {
        bail!(
            "precache of {} failed: {}",
            report.cache,
            report.failure.unwrap_or_default()
        );
    }

    let snapshot = caches.read().await.snapshot();
    snapshot.save(out).await?;

    info!(%version, stored = report.stored, "Warm complete");
    println!("{version}: stored {} URLs in {}", report.stored, report.cache);
    println!("snapshot written to {}", out.display());
    Ok(())
}

async fn inspect(path: &Path) -> anyhow::Result<()> {
    let snapshot = StorageSnapshot::load(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    if snapshot.caches.is_empty() {
        println!("(no caches)");
    }

    for cache in &snapshot.caches {
        let bytes: usize = cache.entries.iter().map(|e| e.body.len()).sum();
        println!("{} ({} entries, {} bytes)", cache.name, cache.entries.len(), bytes);
        for entry in &cache.entries {
            println!(
                "  {:>3} {:<7} {:>8}  {}",
                entry.status,
                format!("{:?}", entry.response_type).to_lowercase(),
                entry.body.len(),
                entry.url
            );
        }
    }
    Ok(())
}
