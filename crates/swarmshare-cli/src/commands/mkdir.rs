//! Mkdir command implementation.

use anyhow::{Context as _, Result};

use super::{Context, MkdirArgs};

/// Run the mkdir command.
pub async fn run(ctx: &Context, args: MkdirArgs) -> Result<()> {
    let (mut tracker, session) = ctx.login(&args.username, &args.password).await?;

    tracker
        .create_dir(session.user_id, &args.name)
        .await
        .with_context(|| format!("Cannot create '{}'", args.name))?;

    let path = tracker
        .list_dirs(session.user_id)
        .await?
        .into_iter()
        .find(|d| d.name == args.name)
        .map(|d| d.path);

    match path {
        Some(path) => println!("Directory '{}' created at {}", args.name, path),
        None => println!("Directory '{}' created.", args.name),
    }

    tracker.logout().await?;
    Ok(())
}
