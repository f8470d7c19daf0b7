//! Peer-side connection to the directory service.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use super::{LOGIN_FAILED, LOGIN_SUCCESS, LOGOUT_SUCCESS, NO_DIRECTORIES, REGISTRATION_SUCCESS};
use crate::error::{Error, Result};
use crate::wire::{self, ActiveDirsPayload, ActivePeer, DirectoryEntry, Timeouts, TrackerCommand, END_OF_LIST};

/// Identity returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    /// Catalog user id
    pub user_id: u64,
    /// Username as stored by the tracker
    pub username: String,
}

/// An open tracker connection.
///
/// Presence lasts as long as this value does: dropping it closes the
/// connection and takes a logged-in peer offline.
#[derive(Debug)]
pub struct TrackerClient {
    addr: SocketAddr,
    local_ip: IpAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeouts: Timeouts,
}

impl TrackerClient {
    /// Connect to the tracker at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectionFailed` if the tracker is unreachable.
    pub async fn connect(addr: SocketAddr, timeouts: &Timeouts) -> Result<Self> {
        let stream = wire::connect(addr, timeouts).await?;
        if let Err(e) = wire::configure_tcp_keepalive(&stream) {
            tracing::warn!("Failed to enable keep-alive towards tracker: {}", e);
        }
        let local_ip = stream.local_addr()?.ip();
        let (read_half, write_half) = stream.into_split();

        tracing::debug!("Connected to tracker at {}", addr);

        Ok(Self {
            addr,
            local_ip,
            reader: BufReader::new(read_half),
            writer: write_half,
            timeouts: *timeouts,
        })
    }

    /// Tracker address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Local interface address used to reach the tracker.
    ///
    /// A reasonable address to advertise for the peer listener when none is
    /// configured.
    #[must_use]
    pub const fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    async fn send(&mut self, command: &TrackerCommand) -> Result<()> {
        wire::write_line(&mut self.writer, &command.to_string(), Some(self.timeouts.io)).await
    }

    async fn recv(&mut self) -> Result<String> {
        wire::expect_line(&mut self.reader, Some(self.timeouts.io))
            .await
            .map_err(|e| match e {
                Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                    Error::ConnectionClosed(self.addr)
                }
                other => other,
            })
    }

    async fn request(&mut self, command: &TrackerCommand) -> Result<String> {
        self.send(command).await?;
        self.recv().await
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if a value is empty or contains
    /// whitespace.
    /// Returns `Error::UserExists` if the username is taken, or
    /// `Error::Remote` for any other refusal.
    pub async fn register(&mut self, username: &str, password: &str) -> Result<()> {
        check_token("username", username)?;
        check_token("password", password)?;
        let reply = self
            .request(&TrackerCommand::Register {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        if reply == REGISTRATION_SUCCESS {
            return Ok(());
        }
        match wire::parse_error_reply(&reply) {
            Some(message) if message.contains("already exists") => {
                Err(Error::UserExists(username.to_string()))
            }
            Some(message) => Err(Error::Remote(message.to_string())),
            None => Err(unexpected(&reply)),
        }
    }

    /// Log in and announce the peer listener at `listen`.
    ///
    /// # Errors
    ///
    /// Returns `Error::LoginFailed` if the credentials are rejected, or
    /// `Error::InvalidArgument` if they cannot be sent as single tokens.
    pub async fn login(
        &mut self,
        username: &str,
        password: &str,
        listen: SocketAddr,
    ) -> Result<LoginSession> {
        check_token("username", username)?;
        check_token("password", password)?;
        let reply = self
            .request(&TrackerCommand::Login {
                username: username.to_string(),
                password: password.to_string(),
                ip: listen.ip(),
                port: listen.port(),
            })
            .await?;

        if reply == LOGIN_FAILED {
            return Err(Error::LoginFailed(username.to_string()));
        }
        if let Some(message) = wire::parse_error_reply(&reply) {
            return Err(Error::Remote(message.to_string()));
        }

        let mut parts = reply.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(LOGIN_SUCCESS), Some(id), Some(name)) => {
                let user_id = id.parse().map_err(|_| unexpected(&reply))?;
                tracing::info!("Logged in to tracker {} as {} ({})", self.addr, name, user_id);
                Ok(LoginSession {
                    user_id,
                    username: name.to_string(),
                })
            }
            _ => Err(unexpected(&reply)),
        }
    }

    /// Go offline without closing the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the tracker does not acknowledge.
    pub async fn logout(&mut self) -> Result<()> {
        let reply = self.request(&TrackerCommand::Logout).await?;
        if reply == LOGOUT_SUCCESS {
            Ok(())
        } else {
            Err(unexpected(&reply))
        }
    }

    /// Declare a new shared directory for the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a name with whitespace,
    /// `Error::DirectoryExists` if it already exists, or
    /// `Error::Remote` for any other refusal.
    pub async fn create_dir(&mut self, user_id: u64, name: &str) -> Result<()> {
        check_token("directory name", name)?;
        let reply = self
            .request(&TrackerCommand::CreateDir {
                user_id,
                name: name.to_string(),
            })
            .await?;

        match wire::parse_error_reply(&reply) {
            None if reply.ends_with("created.") => Ok(()),
            None => Err(unexpected(&reply)),
            Some(message) if message.contains("already exists") => {
                Err(Error::DirectoryExists(name.to_string()))
            }
            Some(message) => Err(Error::Remote(message.to_string())),
        }
    }

    /// Directories declared by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the tracker reports a failure.
    pub async fn list_dirs(&mut self, user_id: u64) -> Result<Vec<DirectoryEntry>> {
        self.send(&TrackerCommand::ListDirs { user_id }).await?;

        let mut dirs = Vec::new();
        loop {
            let line = self.recv().await?;
            if line == END_OF_LIST {
                break;
            }
            if let Some(message) = wire::parse_error_reply(&line) {
                return Err(Error::Remote(message.to_string()));
            }
            if line == NO_DIRECTORIES {
                continue;
            }
            let (name, path) = line.split_once(" - ").ok_or_else(|| unexpected(&line))?;
            dirs.push(DirectoryEntry {
                name: name.to_string(),
                path: path.to_string(),
            });
        }

        Ok(dirs)
    }

    /// Every online peer with its shared directories.
    ///
    /// # Errors
    ///
    /// Returns `Error::Serialization` if the reply is not valid JSON.
    pub async fn active_peers(&mut self) -> Result<Vec<ActivePeer>> {
        let reply = self.request(&TrackerCommand::GetActiveDirs).await?;
        if let Some(message) = wire::parse_error_reply(&reply) {
            return Err(Error::Remote(message.to_string()));
        }

        let payload: ActiveDirsPayload =
            serde_json::from_str(&reply).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(payload.data)
    }
}

/// Tracker requests are whitespace separated, so every value must be one
/// non-empty token.
fn check_token(field: &str, value: &str) -> Result<()> {
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(Error::InvalidArgument(format!("{field} {value:?}")));
    }
    Ok(())
}

fn unexpected(reply: &str) -> Error {
    Error::ProtocolError(format!("unexpected tracker reply: {reply:?}"))
}
