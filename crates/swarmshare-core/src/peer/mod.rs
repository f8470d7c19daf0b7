//! Peer transfer protocol.
//!
//! Every peer runs a [`PeerServer`] that answers four read-only commands
//! about its local filesystem:
//!
//! ```text
//! LIST_FILE <path>                    -> <json [{name,path},...]>  END_OF_LIST
//! GET_FILE_SIZE <path>                -> <bytes> | ERROR: File not found
//! DOWNLOAD_FILE <path>                -> OK <len> <bytes> END_OF_FILE
//! DOWNLOAD_CHUNK <path> <start> <end> -> OK <len> <bytes> END_OF_CHUNK
//! ```
//!
//! [`PeerClient`] is the matching client. Paths are absolute paths on the
//! serving peer, as advertised by the tracker.

pub mod client;
pub mod server;

pub use client::PeerClient;
pub use server::{PeerServer, PeerServerOptions, PeerStats};
