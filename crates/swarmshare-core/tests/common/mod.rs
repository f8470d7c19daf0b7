//! Common test utilities for swarmshare integration tests.
//!
//! Servers always bind `127.0.0.1:0` so tests can run in parallel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use swarmshare_core::catalog::CatalogStore;
use swarmshare_core::peer::{PeerServer, PeerServerOptions, PeerStats};
use swarmshare_core::tracker::{DirectoryService, TrackerServer};

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Path as the string form used on the wire.
pub fn wire_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Start a tracker with an in-memory catalog, sharing under `shared_root`.
pub async fn start_tracker(shared_root: &Path) -> SocketAddr {
    let service = DirectoryService::new(
        Arc::new(CatalogStore::in_memory()),
        shared_root.to_path_buf(),
    );
    let server = TrackerServer::bind(localhost(), Arc::new(service))
        .await
        .expect("Failed to bind tracker");
    let addr = server.local_addr().expect("tracker addr");
    server.spawn();
    addr
}

/// Start a peer listener and return its address and counters.
pub async fn start_peer() -> (SocketAddr, Arc<PeerStats>) {
    let server = PeerServer::bind(localhost(), PeerServerOptions::default())
        .await
        .expect("Failed to bind peer listener");
    let addr = server.local_addr().expect("peer addr");
    let stats = server.stats();
    server.spawn();
    (addr, stats)
}

/// A peer that reports `size` for any GET_FILE_SIZE and refuses every
/// other request with `ERROR: File not found`.
pub async fn start_size_only_peer(size: u64) -> SocketAddr {
    let listener = TcpListener::bind(localhost())
        .await
        .expect("Failed to bind fake peer");
    let addr = listener.local_addr().expect("fake peer addr");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (read_half, mut write_half) = stream.into_split();
                let mut lines = BufReader::new(read_half).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let reply = if line.starts_with("GET_FILE_SIZE") {
                        size.to_string()
                    } else {
                        "ERROR: File not found".to_string()
                    };
                    if write_half
                        .write_all(format!("{reply}\n").as_bytes())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
    });

    addr
}

/// A peer that accepts connections and never answers or closes them.
pub async fn start_stalling_peer() -> SocketAddr {
    let listener = TcpListener::bind(localhost())
        .await
        .expect("Failed to bind stalling peer");
    let addr = listener.local_addr().expect("stalling peer addr");

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    addr
}

/// An address nothing is listening on.
pub fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("addr")
}

fn localhost() -> SocketAddr {
    "127.0.0.1:0".parse().expect("valid address")
}
