//! Swarm download coordinator.
//!
//! Fetches one file from every online peer that has a copy:
//!
//! 1. Ask the tracker who is online, list each peer's shared directories and
//!    keep the peers whose listing contains the file name.
//! 2. One candidate: a single `DOWNLOAD_FILE`.
//! 3. Several candidates: size the file, split it into chunks assigned
//!    round-robin, and fetch every chunk on its own connection. A failed
//!    chunk is retried against the following candidates.
//! 4. Assemble the chunks in order into a `.part` file and rename it into
//!    place. If any chunk could not be fetched the download fails and no
//!    file is left behind.

pub mod plan;

pub use plan::{plan_chunks, ChunkTask};

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::file;
use crate::peer::PeerClient;
use crate::tracker::TrackerClient;
use crate::wire::Timeouts;

/// A peer that holds a copy of the wanted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Catalog id of the peer
    pub user_id: u64,
    /// Peer listener address
    pub addr: SocketAddr,
    /// Full path of the file on that peer
    pub path: String,
}

/// Swarm download tuning.
#[derive(Debug, Clone, Copy)]
pub struct SwarmOptions {
    /// Bytes per chunk
    pub chunk_size: u64,
    /// Chunk workers allowed to do network I/O at once
    pub max_parallel_chunks: usize,
    /// Connect and per-operation timeouts
    pub timeouts: Timeouts,
    /// Skip the local peer during discovery
    pub exclude_self: bool,
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_parallel_chunks: crate::DEFAULT_PARALLEL_CHUNKS,
            timeouts: Timeouts::default(),
            exclude_self: true,
        }
    }
}

impl From<&TransferConfig> for SwarmOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            max_parallel_chunks: config.max_parallel_chunks,
            timeouts: Timeouts::from(config),
            exclude_self: true,
        }
    }
}

/// How a download was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStrategy {
    /// Whole file from one peer
    Single {
        /// Peer that served the file
        peer: SocketAddr,
    },
    /// Chunks spread over several peers
    Swarm {
        /// Number of chunks
        chunks: u64,
        /// Number of candidates
        peers: usize,
    },
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Where the file was written
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// How it was fetched
    pub strategy: DownloadStrategy,
}

/// Find the online peers sharing a file named `file_name`.
///
/// Each peer is asked over a single connection, directory by directory, and
/// contributes at most one candidate (its first match). Unreachable peers
/// are skipped. `exclude` drops one peer id, normally the caller's own.
///
/// # Errors
///
/// Returns an error only if the tracker query fails.
pub async fn discover_candidates(
    tracker: &mut TrackerClient,
    file_name: &str,
    timeouts: &Timeouts,
    exclude: Option<u64>,
) -> Result<Vec<Candidate>> {
    let peers = tracker.active_peers().await?;
    tracing::debug!("{} peer(s) online", peers.len());

    let mut candidates = Vec::new();
    for peer in peers {
        if Some(peer.user_id) == exclude || peer.directories.is_empty() {
            continue;
        }

        let mut client = match PeerClient::connect(peer.addr(), timeouts).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Skipping peer {}: {}", peer.user_id, e);
                continue;
            }
        };

        for dir in &peer.directories {
            match client.list_files(&dir.path).await {
                Ok(entries) => {
                    if let Some(entry) = entries.into_iter().find(|e| e.name == file_name) {
                        candidates.push(Candidate {
                            user_id: peer.user_id,
                            addr: peer.addr(),
                            path: entry.path,
                        });
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Listing {} on peer {} failed: {}", dir.path, peer.user_id, e);
                    break;
                }
            }
        }
    }

    tracing::info!("{} candidate(s) for '{}'", candidates.len(), file_name);
    Ok(candidates)
}

/// Downloads files into `<download_root>/<peer_id>/download/`.
#[derive(Debug, Clone)]
pub struct SwarmDownloader {
    options: SwarmOptions,
    download_root: PathBuf,
}

impl SwarmDownloader {
    /// Create a downloader.
    #[must_use]
    pub fn new(options: SwarmOptions, download_root: PathBuf) -> Self {
        Self {
            options,
            download_root,
        }
    }

    /// Discover candidates through `tracker` and download `file_name` into
    /// the download area of `local_peer_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCandidates` if nobody shares the file,
    /// `Error::IncompleteDownload` if some chunks could not be fetched, or
    /// the first error of a single-peer download.
    pub async fn fetch(
        &self,
        tracker: &mut TrackerClient,
        local_peer_id: u64,
        file_name: &str,
    ) -> Result<DownloadOutcome> {
        file::validate_file_name(file_name)?;

        let exclude = self.options.exclude_self.then_some(local_peer_id);
        let candidates =
            discover_candidates(tracker, file_name, &self.options.timeouts, exclude).await?;

        let dest = file::download_dir(&self.download_root, local_peer_id).join(file_name);
        self.download(file_name, &candidates, &dest).await
    }

    /// Download from an already known candidate list into `dest`.
    ///
    /// # Errors
    ///
    /// See [`SwarmDownloader::fetch`].
    pub async fn download(
        &self,
        file_name: &str,
        candidates: &[Candidate],
        dest: &Path,
    ) -> Result<DownloadOutcome> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);

        let result = match candidates {
            [] => Err(Error::NoCandidates(file_name.to_string())),
            [only] => self.download_single(only, &part).await,
            _ => self.download_swarm(file_name, candidates, &part).await,
        };

        match result {
            Ok((size, strategy)) => {
                tokio::fs::rename(&part, dest).await?;
                tracing::info!(
                    "Downloaded '{}' ({}) to {}",
                    file_name,
                    file::format_size(size),
                    dest.display()
                );
                Ok(DownloadOutcome {
                    path: dest.to_path_buf(),
                    size,
                    strategy,
                })
            }
            Err(e) => {
                // Best effort, the part file may never have been created.
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn download_single(
        &self,
        candidate: &Candidate,
        part: &Path,
    ) -> Result<(u64, DownloadStrategy)> {
        tracing::info!("Downloading {} from {}", candidate.path, candidate.addr);

        let mut client = PeerClient::connect(candidate.addr, &self.options.timeouts).await?;
        let mut out = BufWriter::new(tokio::fs::File::create(part).await?);
        let size = client.download_file_to(&candidate.path, &mut out).await?;
        out.flush().await?;
        out.into_inner().sync_all().await?;

        Ok((
            size,
            DownloadStrategy::Single {
                peer: candidate.addr,
            },
        ))
    }

    async fn download_swarm(
        &self,
        file_name: &str,
        candidates: &[Candidate],
        part: &Path,
    ) -> Result<(u64, DownloadStrategy)> {
        let size = self.probe_size(candidates).await?;
        let plan = plan_chunks(size, self.options.chunk_size, candidates.len());
        tracing::info!(
            "Downloading '{}' ({}) in {} chunk(s) from {} peers",
            file_name,
            file::format_size(size),
            plan.len(),
            candidates.len()
        );

        let candidates: Arc<[Candidate]> = candidates.into();
        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel_chunks.max(1)));
        let received: Arc<Mutex<BTreeMap<u64, Vec<u8>>>> = Arc::default();

        let mut workers = JoinSet::new();
        for task in &plan {
            let worker = ChunkWorker {
                task: *task,
                candidates: Arc::clone(&candidates),
                timeouts: self.options.timeouts,
            };
            let semaphore = Arc::clone(&semaphore);
            let received = Arc::clone(&received);
            workers.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::ProtocolError("chunk scheduler closed".to_string()))?;
                let bytes = worker.run().await?;
                received.lock().await.insert(worker.task.chunk_index, bytes);
                Ok::<(), Error>(())
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("{}", e),
                Err(e) => tracing::warn!("Chunk worker panicked: {}", e),
            }
        }

        let chunks = std::mem::take(&mut *received.lock().await);
        let missing: Vec<u64> = plan
            .iter()
            .map(|task| task.chunk_index)
            .filter(|index| !chunks.contains_key(index))
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteDownload {
                file: file_name.to_string(),
                missing,
            });
        }

        let mut out = BufWriter::new(tokio::fs::File::create(part).await?);
        for bytes in chunks.values() {
            out.write_all(bytes).await?;
        }
        out.flush().await?;
        out.into_inner().sync_all().await?;

        Ok((
            size,
            DownloadStrategy::Swarm {
                chunks: plan.len() as u64,
                peers: candidates.len(),
            },
        ))
    }

    /// Size of the file according to the first candidate that answers.
    async fn probe_size(&self, candidates: &[Candidate]) -> Result<u64> {
        let mut last_error = None;
        for candidate in candidates {
            let attempt = async {
                let mut client =
                    PeerClient::connect(candidate.addr, &self.options.timeouts).await?;
                client.file_size(&candidate.path).await
            };
            match attempt.await {
                Ok(size) => return Ok(size),
                Err(e) => {
                    tracing::warn!("Size probe on {} failed: {}", candidate.addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::NoCandidates(String::new())))
    }
}

/// Fetches one chunk, falling back to the next candidates in order.
struct ChunkWorker {
    task: ChunkTask,
    candidates: Arc<[Candidate]>,
    timeouts: Timeouts,
}

impl ChunkWorker {
    async fn run(&self) -> Result<Vec<u8>> {
        let count = self.candidates.len();
        let mut last_error = None;

        for attempt in 0..count {
            let candidate = &self.candidates[(self.task.assigned_peer + attempt) % count];
            match self.fetch_from(candidate).await {
                Ok(bytes) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Chunk {} recovered from {} after {} failure(s)",
                            self.task.chunk_index,
                            candidate.addr,
                            attempt
                        );
                    }
                    return Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(
                        "Chunk {} from {} failed: {}",
                        self.task.chunk_index,
                        candidate.addr,
                        e
                    );
                    let recoverable = e.is_recoverable();
                    last_error = Some(e);
                    if !recoverable {
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NoCandidates(String::new())))
    }

    async fn fetch_from(&self, candidate: &Candidate) -> Result<Vec<u8>> {
        let mut client = PeerClient::connect(candidate.addr, &self.timeouts).await?;
        let bytes = client
            .download_chunk(&candidate.path, self.task.start, self.task.end)
            .await?;

        let expected = self.task.byte_len();
        if bytes.len() as u64 != expected {
            return Err(Error::ChunkLength {
                file: candidate.path.clone(),
                chunk: self.task.chunk_index,
                expected,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
