//! Client side of the peer transfer protocol.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncWrite, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{Error, Result};
use crate::wire::{self, FileEntry, PeerCommand, StreamHeader, Timeouts, END_OF_CHUNK, END_OF_FILE, END_OF_LIST};

/// Open connection to a peer listener.
///
/// Commands are sequential: each call sends one request and consumes its
/// whole reply, so the connection can be reused.
#[derive(Debug)]
pub struct PeerClient {
    addr: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeouts: Timeouts,
}

impl PeerClient {
    /// Connect to the peer listener at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionFailed` if the peer is unreachable.
    pub async fn connect(addr: SocketAddr, timeouts: &Timeouts) -> Result<Self> {
        let stream = wire::connect(addr, timeouts).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            addr,
            reader: BufReader::new(read_half),
            writer: write_half,
            timeouts: *timeouts,
        })
    }

    fn limit(&self) -> Option<std::time::Duration> {
        Some(self.timeouts.io)
    }

    fn closed(&self, e: Error) -> Error {
        match e {
            Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::ConnectionClosed(self.addr)
            }
            other => other,
        }
    }

    async fn send(&mut self, command: &PeerCommand) -> Result<()> {
        let limit = self.limit();
        wire::write_line(&mut self.writer, &command.to_string(), limit).await
    }

    async fn recv(&mut self) -> Result<String> {
        let limit = self.limit();
        wire::expect_line(&mut self.reader, limit)
            .await
            .map_err(|e| self.closed(e))
    }

    /// Regular files directly inside `dir` on the peer.
    ///
    /// A path that does not exist on the peer lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an error on connection failure or a malformed reply.
    pub async fn list_files(&mut self, dir: &str) -> Result<Vec<FileEntry>> {
        self.send(&PeerCommand::ListFile {
            path: dir.to_string(),
        })
        .await?;

        let line = self.recv().await?;
        if let Some(message) = wire::parse_error_reply(&line) {
            return Err(Error::Remote(message.to_string()));
        }
        let entries: Vec<FileEntry> =
            serde_json::from_str(&line).map_err(|e| Error::Serialization(e.to_string()))?;

        let limit = self.limit();
        wire::expect_sentinel(&mut self.reader, END_OF_LIST, limit)
            .await
            .map_err(|e| self.closed(e))?;

        Ok(entries)
    }

    /// Size in bytes of `path` on the peer.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the peer does not have the file.
    pub async fn file_size(&mut self, path: &str) -> Result<u64> {
        self.send(&PeerCommand::GetFileSize {
            path: path.to_string(),
        })
        .await?;

        let line = self.recv().await?;
        if let Some(message) = wire::parse_error_reply(&line) {
            return Err(remote_error(path, message));
        }
        line.trim()
            .parse()
            .map_err(|_| Error::ProtocolError(format!("invalid file size: {line:?}")))
    }

    /// Stream the whole of `path` into `out`. Returns the number of bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the peer does not have the file, or an
    /// error if the stream is cut short.
    pub async fn download_file_to<W>(&mut self, path: &str, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        self.send(&PeerCommand::DownloadFile {
            path: path.to_string(),
        })
        .await?;
        self.receive_stream(path, out, END_OF_FILE, None).await
    }

    /// Bytes of the inclusive range `[start, end]` of `path`.
    ///
    /// The peer truncates ranges that run past the end of the file, so the
    /// result may be shorter than requested.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the peer does not have the file, or
    /// `Error::ProtocolError` if the peer announces more bytes than the range
    /// holds.
    pub async fn download_chunk(&mut self, path: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        self.send(&PeerCommand::DownloadChunk {
            path: path.to_string(),
            start,
            end,
        })
        .await?;

        let requested = if start > end { 0 } else { end - start + 1 };
        let mut buf = Vec::new();
        self.receive_stream(path, &mut buf, END_OF_CHUNK, Some(requested))
            .await?;
        Ok(buf)
    }

    async fn receive_stream<W>(
        &mut self,
        path: &str,
        out: &mut W,
        sentinel: &str,
        max_len: Option<u64>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let limit = self.limit();
        let header = wire::read_stream_header(&mut self.reader, limit)
            .await
            .map_err(|e| self.closed(e))?;

        let len = match header {
            StreamHeader::Data(len) => len,
            StreamHeader::Error(message) => return Err(remote_error(path, &message)),
        };
        if let Some(max) = max_len.filter(|&max| len > max) {
            return Err(Error::ProtocolError(format!(
                "{} announced {len} bytes for a {max} byte range",
                self.addr
            )));
        }

        wire::copy_exact(&mut self.reader, out, len, limit)
            .await
            .map_err(|e| self.closed(e))?;
        wire::expect_sentinel(&mut self.reader, sentinel, limit)
            .await
            .map_err(|e| self.closed(e))?;

        Ok(len)
    }
}

fn remote_error(path: &str, message: &str) -> Error {
    if message == "File not found" {
        Error::FileNotFound(path.to_string())
    } else {
        Error::Remote(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{PeerServer, PeerServerOptions};
    use tempfile::TempDir;

    async fn client() -> PeerClient {
        let server = PeerServer::bind("127.0.0.1:0".parse().unwrap(), PeerServerOptions::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        server.spawn();
        PeerClient::connect(addr, &Timeouts::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_commands_share_one_connection() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let path = path.to_string_lossy().into_owned();

        let mut client = client().await;

        assert_eq!(client.file_size(&path).await.unwrap(), 10);
        assert_eq!(client.download_chunk(&path, 2, 4).await.unwrap(), b"234");
        assert_eq!(client.download_chunk(&path, 8, 100).await.unwrap(), b"89");
        assert!(client.download_chunk(&path, 5, 1).await.unwrap().is_empty());

        let mut whole = Vec::new();
        assert_eq!(client.download_file_to(&path, &mut whole).await.unwrap(), 10);
        assert_eq!(whole, b"0123456789");

        let listing = client
            .list_files(&temp_dir.path().to_string_lossy())
            .await
            .unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "data.bin");
    }

    #[tokio::test]
    async fn test_oversized_chunk_header_is_refused() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                // Announce 50 MiB and then stall.
                write_half.write_all(b"OK 52428800\n").await.unwrap();
            }
        });

        let mut client = PeerClient::connect(addr, &Timeouts::default()).await.unwrap();
        let err = client.download_chunk("/x", 0, 1023).await.unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_not_found_maps_to_error() {
        let mut client = client().await;
        assert!(matches!(
            client.file_size("/no/such/file").await,
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            client.download_chunk("/no/such/file", 0, 9).await,
            Err(Error::FileNotFound(_))
        ));
        // Connection still usable after an error reply.
        assert!(client.list_files("/no/such/dir").await.unwrap().is_empty());
    }
}
