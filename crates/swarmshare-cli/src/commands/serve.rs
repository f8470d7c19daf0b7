//! Serve command implementation.

use anyhow::Result;

use swarmshare_core::file::format_size;

use super::{Context, ServeArgs};
use crate::ui;

/// Run the serve command.
pub async fn run(ctx: &Context, args: ServeArgs) -> Result<()> {
    let (server, mut tracker, session) = ctx
        .go_online(&args.username, &args.password, &args.listen)
        .await?;

    let listen_addr = server.local_addr()?;
    let stats = server.stats();
    let dirs = tracker.list_dirs(session.user_id).await?;

    ui::print_banner();
    println!("  Logged in as {} (id {})", session.username, session.user_id);
    println!("  Serving on   {}", listen_addr);
    println!("  Tracker      {}", tracker.addr());
    println!();
    println!("  Shared directories:");
    ui::display_directories(&dirs);
    println!();
    println!("  Press Ctrl+C to go offline.");
    println!();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    if let Err(e) = tracker.logout().await {
        tracing::warn!("Logout failed: {}", e);
    }

    println!();
    println!(
        "  Served {} request(s) over {} connection(s), {} sent.",
        stats.requests(),
        stats.connections(),
        format_size(stats.bytes_sent())
    );
    Ok(())
}
