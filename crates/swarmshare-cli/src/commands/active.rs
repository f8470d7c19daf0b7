//! Active command implementation.

use anyhow::Result;

use swarmshare_core::wire::ActiveDirsPayload;

use super::{ActiveArgs, Context};
use crate::ui;

/// Run the active command.
pub async fn run(ctx: &Context, args: ActiveArgs) -> Result<()> {
    let mut tracker = ctx.connect_tracker().await?;
    let peers = tracker.active_peers().await?;

    if args.json {
        let payload = ActiveDirsPayload::new(peers);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!();
    ui::display_peers(&peers);
    Ok(())
}
