//! Dirs command implementation.

use anyhow::Result;

use super::{Context, DirsArgs};
use crate::ui;

/// Run the dirs command.
pub async fn run(ctx: &Context, args: DirsArgs) -> Result<()> {
    let mut tracker = ctx.connect_tracker().await?;
    let dirs = tracker.list_dirs(args.user_id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&dirs)?);
        return Ok(());
    }

    println!("Shared directories of user {}:", args.user_id);
    ui::display_directories(&dirs);
    Ok(())
}
