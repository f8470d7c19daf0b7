//! Line-oriented wire format shared by the tracker and peer protocols.
//!
//! Every request is a single UTF-8 line terminated by `\n`. Replies are
//! either a single line, a run of lines closed by a sentinel line, or a raw
//! byte stream:
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────────┐
//! │ OK <len>\n   │ <len raw bytes>      │ <SENTINEL>\n     │
//! └──────────────┴──────────────────────┴──────────────────┘
//! ```
//!
//! The `OK <len>` header makes binary payloads unambiguous: file content
//! that happens to contain a sentinel, or to start with `ERROR:`, is never
//! misread. The sentinel trailer is still required and checked by readers.
//!
//! Failures are single lines starting with [`ERROR_PREFIX`].

pub mod command;

pub use command::{CommandError, PeerCommand, TrackerCommand};

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Closes a LIST_FILE or LIST_DIRS reply.
pub const END_OF_LIST: &str = "END_OF_LIST";

/// Closes a DOWNLOAD_FILE byte stream.
pub const END_OF_FILE: &str = "END_OF_FILE";

/// Closes a DOWNLOAD_CHUNK byte stream.
pub const END_OF_CHUNK: &str = "END_OF_CHUNK";

/// Prefix of every error reply.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Reply for a missing file.
pub const FILE_NOT_FOUND: &str = "ERROR: File not found";

/// Header prefix of a raw byte stream.
pub const STREAM_HEADER: &str = "OK";

/// Longest line accepted from the network (16 MB).
pub const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Buffer size for streaming payloads.
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Status value of a GET_ACTIVE_DIRS reply.
pub const ACTIVE_DIRS_STATUS: &str = "ACTIVE_DIRS";

/// A regular file as advertised by LIST_FILE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name
    pub name: String,
    /// Full path on the serving peer
    pub path: String,
}

/// A shared directory as advertised by GET_ACTIVE_DIRS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Directory name
    pub name: String,
    /// Absolute path on the owning peer
    pub path: String,
}

/// One online peer in a GET_ACTIVE_DIRS reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePeer {
    /// Catalog id of the peer's user
    pub user_id: u64,
    /// Address the peer listener is reachable on
    pub ip: IpAddr,
    /// Peer listener port
    pub port: u16,
    /// Directories shared by the peer
    pub directories: Vec<DirectoryEntry>,
}

impl ActivePeer {
    /// Socket address of the peer listener.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// GET_ACTIVE_DIRS reply payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDirsPayload {
    /// Always [`ACTIVE_DIRS_STATUS`]
    pub status: String,
    /// Online peers
    #[serde(default)]
    pub data: Vec<ActivePeer>,
}

impl ActiveDirsPayload {
    /// Wrap a list of online peers.
    #[must_use]
    pub fn new(data: Vec<ActivePeer>) -> Self {
        Self {
            status: ACTIVE_DIRS_STATUS.to_string(),
            data,
        }
    }
}

/// Header line of a byte-stream reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHeader {
    /// `len` raw bytes follow
    Data(u64),
    /// The request failed with the given message
    Error(String),
}

/// Connect and read/write timeouts applied to client operations.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Timeout for establishing a connection
    pub connect: Duration,
    /// Timeout for each socket read or write
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(crate::DEFAULT_CONNECT_TIMEOUT_SECS),
            io: Duration::from_secs(crate::DEFAULT_IO_TIMEOUT_SECS),
        }
    }
}

impl From<&crate::config::TransferConfig> for Timeouts {
    fn from(config: &crate::config::TransferConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            io: config.io_timeout,
        }
    }
}

/// Format an error reply line.
#[must_use]
pub fn error_reply(message: &str) -> String {
    format!("{ERROR_PREFIX} {message}")
}

/// Return the message of an error reply, or `None` for any other line.
#[must_use]
pub fn parse_error_reply(line: &str) -> Option<&str> {
    line.strip_prefix(ERROR_PREFIX).map(str::trim)
}

/// Run `fut`, failing with [`Error::Timeout`] once `limit` elapses.
///
/// # Errors
///
/// Returns `Error::Timeout` if the limit is exceeded, otherwise the future's own result.
pub async fn with_timeout<F, T>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(duration) => timeout(duration, fut)
            .await
            .map_err(|_| Error::Timeout(duration.as_secs()))?,
        None => fut.await,
    }
}

/// Open a TCP connection within the connect timeout.
///
/// # Errors
///
/// Returns `Error::ConnectionFailed` if the peer is unreachable or does not
/// answer in time.
pub async fn connect(addr: SocketAddr, timeouts: &Timeouts) -> Result<TcpStream> {
    let stream = match timeout(timeouts.connect, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(Error::ConnectionFailed {
                addr,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(Error::ConnectionFailed {
                addr,
                reason: format!("no answer within {}s", timeouts.connect.as_secs()),
            })
        }
    };
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Configure TCP keep-alive on a long-lived socket.
///
/// Tracker connections double as presence, so a peer that vanishes without
/// closing its socket must eventually be noticed:
/// - Start probing after 10 seconds of idle time
/// - Send probes every 5 seconds
///
/// # Errors
///
/// Returns an error if the socket option cannot be set.
pub fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = socket2::SockRef::from(stream);

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(|e| Error::Io(io::Error::other(e)))?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}

/// Read one line, without its terminator.
///
/// Returns `None` on a clean end of stream.
///
/// # Errors
///
/// Returns an error on I/O failure, timeout, invalid UTF-8, or a line longer
/// than [`MAX_LINE_LEN`].
pub async fn read_line<R>(reader: &mut R, limit: Option<Duration>) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    with_timeout(limit, async {
        let mut buf = Vec::new();
        let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64 + 1);
        let read = limited.read_until(b'\n', &mut buf).await?;
        if read == 0 {
            return Ok(None);
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        if buf.len() > MAX_LINE_LEN {
            return Err(Error::ProtocolError(format!(
                "line exceeds {MAX_LINE_LEN} bytes"
            )));
        }
        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| Error::ProtocolError("line is not valid UTF-8".to_string()))
    })
    .await
}

/// Read one line, treating end of stream as an error.
///
/// # Errors
///
/// Returns an `UnexpectedEof` I/O error if the stream ends first.
pub async fn expect_line<R>(reader: &mut R, limit: Option<Duration>) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    read_line(reader, limit).await?.ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        ))
    })
}

/// Write one line followed by `\n` and flush.
///
/// # Errors
///
/// Returns an error if writing fails or times out.
pub async fn write_line<W>(writer: &mut W, line: &str, limit: Option<Duration>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    with_timeout(limit, async {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    })
    .await
}

/// Write the `OK <len>` header of a byte stream.
///
/// # Errors
///
/// Returns an error if writing fails or times out.
pub async fn write_stream_header<W>(writer: &mut W, len: u64, limit: Option<Duration>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_line(writer, &format!("{STREAM_HEADER} {len}"), limit).await
}

/// Parse a byte-stream header line.
///
/// # Errors
///
/// Returns `Error::ProtocolError` for anything that is neither `OK <len>`
/// nor an error reply.
pub fn parse_stream_header(line: &str) -> Result<StreamHeader> {
    if let Some(message) = parse_error_reply(line) {
        return Ok(StreamHeader::Error(message.to_string()));
    }

    let len = line
        .strip_prefix(STREAM_HEADER)
        .map(str::trim)
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| Error::ProtocolError(format!("unexpected stream header: {line:?}")))?;

    Ok(StreamHeader::Data(len))
}

/// Read and parse a byte-stream header.
///
/// # Errors
///
/// Returns an error if the header is missing or malformed.
pub async fn read_stream_header<R>(reader: &mut R, limit: Option<Duration>) -> Result<StreamHeader>
where
    R: AsyncBufRead + Unpin,
{
    let line = expect_line(reader, limit).await?;
    parse_stream_header(&line)
}

/// Copy exactly `len` bytes from `reader` to `writer`.
///
/// The timeout applies to every individual read and write, so the total
/// duration of a large transfer is not bounded.
///
/// # Errors
///
/// Returns an error if the stream ends early, or a read/write fails or
/// times out.
pub async fn copy_exact<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    limit: Option<Duration>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut remaining = len;

    while remaining > 0 {
        #[allow(clippy::cast_possible_truncation)]
        let want = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
        let read = with_timeout(limit, async { Ok(reader.read(&mut buf[..want]).await?) }).await?;
        if read == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {remaining} of {len} bytes outstanding"),
            )));
        }
        with_timeout(limit, async { Ok(writer.write_all(&buf[..read]).await?) }).await?;
        remaining -= read as u64;
    }

    with_timeout(limit, async { Ok(writer.flush().await?) }).await?;
    Ok(len)
}

/// Read the next line and require it to be `sentinel`.
///
/// # Errors
///
/// Returns `Error::ProtocolError` if another line (or nothing) arrives.
pub async fn expect_sentinel<R>(reader: &mut R, sentinel: &str, limit: Option<Duration>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let line = expect_line(reader, limit).await?;
    if line == sentinel {
        Ok(())
    } else {
        Err(Error::ProtocolError(format!(
            "expected {sentinel}, got {line:?}"
        )))
    }
}
