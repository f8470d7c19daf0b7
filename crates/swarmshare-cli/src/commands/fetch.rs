//! Fetch command implementation.

use std::time::Instant;

use anyhow::Result;

use swarmshare_core::file::format_size;
use swarmshare_core::swarm::{DownloadStrategy, SwarmDownloader, SwarmOptions};
use swarmshare_core::Error;

use super::{Context, FetchArgs};

/// Run the fetch command.
pub async fn run(ctx: &Context, args: FetchArgs) -> Result<()> {
    let (server, mut tracker, session) = ctx
        .go_online(&args.username, &args.password, &args.listen)
        .await?;
    // Stay servable while downloading.
    let serving = server.spawn();

    let mut options = SwarmOptions::from(&ctx.config.transfer);
    if let Some(chunk_size) = args.chunk_size {
        options.chunk_size = chunk_size;
    }
    if let Some(parallel) = args.parallel {
        options.max_parallel_chunks = parallel;
    }
    options.exclude_self = !args.include_self;

    let download_root = args
        .output
        .unwrap_or_else(|| ctx.config.transfer.download_root());
    let downloader = SwarmDownloader::new(options, download_root);

    let start = Instant::now();
    let result = downloader
        .fetch(&mut tracker, session.user_id, &args.file_name)
        .await;
    let elapsed = start.elapsed();

    if let Err(e) = tracker.logout().await {
        tracing::warn!("Logout failed: {}", e);
    }
    serving.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(Error::IncompleteDownload { file, missing }) => {
            anyhow::bail!(
                "Could not fetch '{}': chunk(s) {:?} failed on every peer",
                file,
                missing
            );
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        let (mode, chunks, peers) = match outcome.strategy {
            DownloadStrategy::Single { .. } => ("single", 1, 1),
            DownloadStrategy::Swarm { chunks, peers } => ("swarm", chunks, peers),
        };
        let output = serde_json::json!({
            "file": args.file_name,
            "path": outcome.path,
            "size": outcome.size,
            "mode": mode,
            "chunks": chunks,
            "peers": peers,
            "elapsed_ms": elapsed.as_millis(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  Downloaded {} ({})", args.file_name, format_size(outcome.size));
    match outcome.strategy {
        DownloadStrategy::Single { peer } => println!("  From:    {}", peer),
        DownloadStrategy::Swarm { chunks, peers } => {
            println!("  From:    {} peers, {} chunks", peers, chunks);
        }
    }
    println!("  Saved:   {}", outcome.path.display());
    println!("  Time:    {:.1}s", elapsed.as_secs_f64());
    println!();

    Ok(())
}
