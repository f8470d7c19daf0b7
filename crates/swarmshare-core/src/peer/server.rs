//! Peer listener.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::{self, SharedFile};
use crate::wire::{self, FileEntry, PeerCommand, END_OF_CHUNK, END_OF_FILE, END_OF_LIST, FILE_NOT_FOUND};

/// Peer listener tuning.
#[derive(Debug, Clone, Copy)]
pub struct PeerServerOptions {
    /// How long a connection may sit between commands (None = forever)
    pub idle_timeout: Option<Duration>,
    /// Timeout for each socket write while replying
    pub io_timeout: Duration,
}

impl Default for PeerServerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(crate::DEFAULT_PEER_IDLE_TIMEOUT_SECS)),
            io_timeout: Duration::from_secs(crate::DEFAULT_IO_TIMEOUT_SECS),
        }
    }
}

impl From<&Config> for PeerServerOptions {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: Some(config.peer.idle_timeout),
            io_timeout: config.transfer.io_timeout,
        }
    }
}

/// Counters maintained by a running peer listener.
#[derive(Debug, Default)]
pub struct PeerStats {
    connections: AtomicU64,
    requests: AtomicU64,
    bytes_sent: AtomicU64,
}

impl PeerStats {
    /// Connections accepted so far.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Commands handled so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Payload bytes streamed so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Listening peer transfer server.
#[derive(Debug)]
pub struct PeerServer {
    listener: TcpListener,
    options: PeerServerOptions,
    stats: Arc<PeerStats>,
}

impl PeerServer {
    /// Bind the peer listener to `addr` (port 0 picks an ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, options: PeerServerOptions) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Peer listener on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            options,
            stats: Arc::new(PeerStats::default()),
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the listener's counters.
    #[must_use]
    pub fn stats(&self) -> Arc<PeerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections forever.
    ///
    /// # Errors
    ///
    /// Never returns on its own; failed accepts are logged and skipped.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, remote) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Peer accept failed: {}", e);
                    continue;
                }
            };
            self.stats.connections.fetch_add(1, Ordering::Relaxed);

            let options = self.options;
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                tracing::debug!("Peer connection from {}", remote);
                match handle_connection(stream, options, stats).await {
                    Ok(()) => tracing::debug!("Peer connection {} closed", remote),
                    Err(e) => tracing::debug!("Peer connection {} ended: {}", remote, e),
                }
            });
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

async fn handle_connection(
    stream: TcpStream,
    options: PeerServerOptions,
    stats: Arc<PeerStats>,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let line = match wire::read_line(&mut reader, options.idle_timeout).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(Error::Timeout(secs)) => {
                tracing::debug!("Closing peer connection idle for {}s", secs);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        stats.requests.fetch_add(1, Ordering::Relaxed);
        match PeerCommand::parse(&line) {
            Ok(command) => {
                tracing::debug!("{}", command);
                dispatch(command, &mut writer, &options, &stats).await?;
            }
            Err(e) => {
                tracing::debug!("Rejected peer request: {:?}", e);
                wire::write_line(&mut writer, &e.reply(), Some(options.io_timeout)).await?;
            }
        }
    }
}

async fn dispatch(
    command: PeerCommand,
    writer: &mut OwnedWriteHalf,
    options: &PeerServerOptions,
    stats: &PeerStats,
) -> Result<()> {
    let limit = Some(options.io_timeout);

    match command {
        PeerCommand::ListFile { path } => {
            let files = list_files(PathBuf::from(path)).await;
            let entries: Vec<FileEntry> = files.iter().map(FileEntry::from).collect();
            let json =
                serde_json::to_string(&entries).map_err(|e| Error::Serialization(e.to_string()))?;
            wire::write_line(writer, &json, limit).await?;
            wire::write_line(writer, END_OF_LIST, limit).await
        }

        PeerCommand::GetFileSize { path } => {
            let reply = match file::file_size(Path::new(&path)).await {
                Some(size) => size.to_string(),
                None => FILE_NOT_FOUND.to_string(),
            };
            wire::write_line(writer, &reply, limit).await
        }

        PeerCommand::DownloadFile { path } => {
            stream_range(writer, Path::new(&path), 0, u64::MAX, END_OF_FILE, limit, stats).await
        }

        PeerCommand::DownloadChunk { path, start, end } => {
            stream_range(writer, Path::new(&path), start, end, END_OF_CHUNK, limit, stats).await
        }
    }
}

/// LIST_FILE never fails: an unreadable directory lists as empty.
async fn list_files(dir: PathBuf) -> Vec<SharedFile> {
    let listing = tokio::task::spawn_blocking(move || file::list_shared_files(&dir)).await;
    match listing {
        Ok(Ok(files)) => files,
        Ok(Err(e)) => {
            tracing::debug!("LIST_FILE: {}", e);
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("LIST_FILE task failed: {}", e);
            Vec::new()
        }
    }
}

async fn stream_range(
    writer: &mut OwnedWriteHalf,
    path: &Path,
    start: u64,
    end: u64,
    sentinel: &str,
    limit: Option<Duration>,
    stats: &PeerStats,
) -> Result<()> {
    let (mut reader, len) = match file::open_range(path, start, end).await {
        Ok(opened) => opened,
        Err(Error::FileNotFound(_)) => {
            return wire::write_line(writer, FILE_NOT_FOUND, limit).await;
        }
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            return wire::write_line(writer, &wire::error_reply("Cannot read file"), limit).await;
        }
    };

    wire::write_stream_header(writer, len, limit).await?;
    wire::copy_exact(&mut reader, writer, len, limit).await?;
    wire::write_line(writer, sentinel, limit).await?;

    stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
    Ok(())
}
