//! Config command implementation.

use anyhow::{Context as _, Result};

use super::{ConfigArgs, Context};

/// Run the config command.
pub fn run(ctx: &Context, args: &ConfigArgs) -> Result<()> {
    if args.path {
        println!("{}", ctx.config_path.display());
        return Ok(());
    }

    if args.init {
        if ctx.config_path.exists() {
            println!("Config already exists at {}", ctx.config_path.display());
        } else {
            ctx.config.save_to(&ctx.config_path)?;
            println!("Wrote default config to {}", ctx.config_path.display());
        }
        return Ok(());
    }

    let rendered =
        toml::to_string_pretty(&ctx.config).context("Failed to render configuration")?;
    println!("# {}", ctx.config_path.display());
    println!("{}", rendered);
    Ok(())
}
