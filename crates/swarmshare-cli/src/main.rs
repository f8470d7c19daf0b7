//! Swarmshare CLI - tracker-assisted peer-to-peer file sharing
//!
//! One binary plays every role: the tracker, a sharing peer, and a
//! downloading peer.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the tracker
//! swarmshare tracker
//!
//! # Create an account and a shared directory
//! swarmshare register alice secret
//! swarmshare mkdir alice secret music
//!
//! # Share (stay online until ctrl-c)
//! swarmshare serve alice secret
//!
//! # Fetch a file from everyone who has it
//! swarmshare fetch bob hunter2 album.zip
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command, Context};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Command::Tracker(args) => commands::tracker::run(&ctx, args).await,
        Command::Register(args) => commands::register::run(&ctx, args).await,
        Command::Mkdir(args) => commands::mkdir::run(&ctx, args).await,
        Command::Dirs(args) => commands::dirs::run(&ctx, args).await,
        Command::Active(args) => commands::active::run(&ctx, args).await,
        Command::Serve(args) => commands::serve::run(&ctx, args).await,
        Command::Fetch(args) => commands::fetch::run(&ctx, args).await,
        Command::Config(args) => commands::config::run(&ctx, &args),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,swarmshare=info,swarmshare_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
