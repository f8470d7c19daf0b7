//! CLI command definitions and handlers.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};

use swarmshare_core::config::Config;
use swarmshare_core::peer::{PeerServer, PeerServerOptions};
use swarmshare_core::tracker::{LoginSession, TrackerClient};
use swarmshare_core::wire::Timeouts;

pub mod active;
pub mod config;
pub mod dirs;
pub mod fetch;
pub mod mkdir;
pub mod register;
pub mod serve;
pub mod tracker;

/// Swarmshare - tracker-assisted peer-to-peer file sharing
#[derive(Parser)]
#[command(name = "swarmshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Tracker address (overrides the configured host and port)
    #[arg(long, global = true)]
    pub tracker: Option<SocketAddr>,

    /// Use this configuration file instead of the default one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the directory service
    Tracker(TrackerArgs),

    /// Create an account on the tracker
    Register(RegisterArgs),

    /// Declare a new shared directory
    Mkdir(MkdirArgs),

    /// List the shared directories of a user
    Dirs(DirsArgs),

    /// Show online peers and what they share
    Active(ActiveArgs),

    /// Go online and serve shared files until interrupted
    Serve(ServeArgs),

    /// Download a file from every peer that has it
    Fetch(FetchArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the tracker command
#[derive(Parser)]
pub struct TrackerArgs {
    /// Address to bind
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to bind
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Root under which shared directories are created
    #[arg(long)]
    pub shared_root: Option<PathBuf>,

    /// Catalog file
    #[arg(long, conflicts_with = "in_memory")]
    pub catalog: Option<PathBuf>,

    /// Keep the catalog in memory only
    #[arg(long)]
    pub in_memory: bool,

    /// Record the address peers connect from instead of the one they declare
    #[arg(long)]
    pub observed_address: bool,
}

/// Arguments for the register command
#[derive(Parser)]
pub struct RegisterArgs {
    /// Username
    pub username: String,

    /// Password
    pub password: String,
}

/// Arguments for the mkdir command
#[derive(Parser)]
pub struct MkdirArgs {
    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Name of the new shared directory
    pub name: String,
}

/// Arguments for the dirs command
#[derive(Parser)]
pub struct DirsArgs {
    /// User id
    pub user_id: u64,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the active command
#[derive(Parser)]
pub struct ActiveArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Peer listener options shared by serve and fetch
#[derive(Args)]
pub struct ListenArgs {
    /// Peer listener port (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to advertise to other peers
    #[arg(long)]
    pub advertise: Option<IpAddr>,
}

/// Arguments for the serve command
#[derive(Parser)]
pub struct ServeArgs {
    /// Username
    pub username: String,

    /// Password
    pub password: String,

    #[command(flatten)]
    pub listen: ListenArgs,
}

/// Arguments for the fetch command
#[derive(Parser)]
pub struct FetchArgs {
    /// Username
    pub username: String,

    /// Password
    pub password: String,

    /// Name of the file to download
    pub file_name: String,

    /// Download root (files land in <root>/<user_id>/download/)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Maximum chunks downloaded at once
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Also consider copies shared by this user
    #[arg(long)]
    pub include_self: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub listen: ListenArgs,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Only print the configuration file path
    #[arg(long)]
    pub path: bool,

    /// Write the default configuration if no file exists yet
    #[arg(long, conflicts_with = "path")]
    pub init: bool,
}

/// Settings resolved from the configuration file and global flags.
pub struct Context {
    /// Effective configuration
    pub config: Config,
    /// Configuration file in use
    pub config_path: PathBuf,
    /// Tracker to talk to
    pub tracker: SocketAddr,
}

impl Context {
    /// Load configuration and apply global overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
        let config = Config::load_from(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let tracker = cli.tracker.unwrap_or_else(|| config.tracker.addr());

        Ok(Self {
            config,
            config_path,
            tracker,
        })
    }

    /// Client timeouts from the transfer section.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts::from(&self.config.transfer)
    }

    /// Open a tracker connection.
    pub async fn connect_tracker(&self) -> Result<TrackerClient> {
        TrackerClient::connect(self.tracker, &self.timeouts())
            .await
            .with_context(|| format!("Cannot reach tracker at {}", self.tracker))
    }

    /// Bind the peer listener and log in with its address.
    ///
    /// Returns the listener (not yet accepting), the tracker connection that
    /// carries presence, and the login session.
    pub async fn go_online(
        &self,
        username: &str,
        password: &str,
        listen: &ListenArgs,
    ) -> Result<(PeerServer, TrackerClient, LoginSession)> {
        let bind = SocketAddr::new(
            self.config.peer.bind,
            listen.port.unwrap_or(self.config.peer.port),
        );
        let server = PeerServer::bind(bind, PeerServerOptions::from(&self.config))
            .await
            .with_context(|| format!("Cannot bind peer listener on {bind}"))?;

        let mut tracker = self.connect_tracker().await?;
        let ip = listen
            .advertise
            .or(self.config.peer.advertise_ip)
            .unwrap_or_else(|| tracker.local_ip());
        let advertised = SocketAddr::new(ip, server.local_addr()?.port());

        let session = tracker
            .login(username, password, advertised)
            .await
            .context("Login failed")?;

        Ok((server, tracker, session))
    }

    /// Log in without serving anything.
    pub async fn login(&self, username: &str, password: &str) -> Result<(TrackerClient, LoginSession)> {
        let mut tracker = self.connect_tracker().await?;
        let advertised = SocketAddr::new(tracker.local_ip(), self.config.peer.port);
        let session = tracker
            .login(username, password, advertised)
            .await
            .context("Login failed")?;
        Ok((tracker, session))
    }
}
