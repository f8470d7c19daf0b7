//! Tracker command implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use swarmshare_core::catalog::{Catalog, CatalogStore};
use swarmshare_core::tracker::{DirectoryService, TrackerServer};

use super::{Context, TrackerArgs};
use crate::ui;

/// Run the tracker command.
pub async fn run(ctx: &Context, args: TrackerArgs) -> Result<()> {
    let settings = &ctx.config.tracker;

    let store = if args.in_memory {
        CatalogStore::in_memory()
    } else {
        let path = args.catalog.unwrap_or_else(|| ctx.config.catalog_path());
        CatalogStore::open(path.clone())
            .with_context(|| format!("Cannot open catalog {}", path.display()))?
    };
    let catalog_label = store
        .path()
        .map_or_else(|| "in memory".to_string(), |p| p.display().to_string());
    let catalog: Arc<dyn Catalog> = Arc::new(store);

    let shared_root = args
        .shared_root
        .unwrap_or_else(|| settings.shared_root.clone());
    let trust_declared = settings.trust_declared_address && !args.observed_address;

    let service = DirectoryService::new(catalog, shared_root.clone())
        .with_trust_declared_address(trust_declared);

    let addr = SocketAddr::new(
        args.host.unwrap_or(settings.host),
        args.port.unwrap_or(settings.port),
    );
    let server = TrackerServer::bind(addr, Arc::new(service))
        .await
        .with_context(|| format!("Cannot bind tracker on {addr}"))?;

    ui::print_banner();
    println!("  Tracker:      {}", server.local_addr()?);
    println!("  Shared root:  {}", shared_root.display());
    println!("  Catalog:      {}", catalog_label);
    if !trust_declared {
        println!("  Addresses:    observed");
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down tracker");
        }
    }

    Ok(())
}
