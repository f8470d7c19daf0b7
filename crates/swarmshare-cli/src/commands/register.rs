//! Register command implementation.

use anyhow::Result;

use swarmshare_core::Error;

use super::{Context, RegisterArgs};

/// Run the register command.
pub async fn run(ctx: &Context, args: RegisterArgs) -> Result<()> {
    let mut tracker = ctx.connect_tracker().await?;

    match tracker.register(&args.username, &args.password).await {
        Ok(()) => {
            println!("Registered '{}'.", args.username);
            Ok(())
        }
        Err(Error::UserExists(name)) => anyhow::bail!("Username '{}' is already taken", name),
        Err(e) => Err(e.into()),
    }
}
