//! # Swarmshare Core Library
//!
//! `swarmshare-core` provides the building blocks of swarmshare, a small
//! tracker-assisted peer-to-peer file sharing system.
//!
//! ## Features
//!
//! - **Presence tracking**: a central tracker knows which peers are online
//!   and which directories they share
//! - **Direct transfers**: file bytes always flow peer to peer, never through
//!   the tracker
//! - **Swarm downloads**: a single file is fetched in parallel chunks from
//!   every peer that holds a copy
//!
//! ## Modules
//!
//! - [`catalog`] - Persisted user accounts and shared directory records
//! - [`config`] - Configuration management
//! - [`mod@file`] - Shared directory listing and byte-range reads
//! - [`peer`] - Peer transfer protocol server and client
//! - [`swarm`] - Candidate discovery and chunked multi-peer downloads
//! - [`tracker`] - Directory service: presence registry, server and client
//! - [`wire`] - Line-oriented wire format shared by both protocols
//!
//! ## Example
//!
//! ```rust,ignore
//! use swarmshare_core::swarm::SwarmDownloader;
//! use swarmshare_core::tracker::TrackerClient;
//!
//! let mut tracker = TrackerClient::connect(tracker_addr, &timeouts).await?;
//! let session = tracker.login("alice", "pw1", listen_addr).await?;
//!
//! let downloader = SwarmDownloader::new(options, download_root);
//! let outcome = downloader.fetch(&mut tracker, session.user_id, "report.pdf").await?;
//! println!("saved to {}", outcome.path.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod file;
pub mod peer;
pub mod swarm;
pub mod tracker;
pub mod wire;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracker port (TCP)
pub const DEFAULT_TRACKER_PORT: u16 = 5001;

/// Default peer listener port (TCP, 0 = pick an ephemeral port)
pub const DEFAULT_PEER_PORT: u16 = 0;

/// Default chunk size for swarm downloads (1 MB)
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum chunk workers performing network I/O at the same time
pub const DEFAULT_PARALLEL_CHUNKS: usize = 8;

/// Default connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-read/per-write timeout in seconds
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout between commands on a peer connection, in seconds
pub const DEFAULT_PEER_IDLE_TIMEOUT_SECS: u64 = 300;
