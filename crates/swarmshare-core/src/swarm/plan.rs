//! Chunk partitioning for swarm downloads.

/// One contiguous byte range of the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTask {
    /// Position of the chunk in the file
    pub chunk_index: u64,
    /// First byte offset
    pub start: u64,
    /// Last byte offset (inclusive)
    pub end: u64,
    /// Index into the candidate list of the first peer to ask
    pub assigned_peer: usize,
}

impl ChunkTask {
    /// Number of bytes the chunk covers.
    #[must_use]
    pub const fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Split `[0, size)` into `chunk_size` ranges assigned round-robin over
/// `peer_count` candidates.
///
/// The last chunk may be shorter. A zero-byte file has no chunks.
#[must_use]
pub fn plan_chunks(size: u64, chunk_size: u64, peer_count: usize) -> Vec<ChunkTask> {
    if size == 0 || peer_count == 0 {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let count = size.div_ceil(chunk_size);

    (0..count)
        .map(|chunk_index| {
            let start = chunk_index * chunk_size;
            let end = (start + chunk_size).min(size) - 1;
            #[allow(clippy::cast_possible_truncation)]
            let assigned_peer = (chunk_index % peer_count as u64) as usize;
            ChunkTask {
                chunk_index,
                start,
                end,
                assigned_peer,
            }
        })
        .collect()
}
