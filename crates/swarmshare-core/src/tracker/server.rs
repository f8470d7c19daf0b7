//! TCP front end of the directory service.
//!
//! One task per connection. A connection stays open across any number of
//! commands and errors; the peer it logged in as goes offline when it closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    ConnectionId, DirectoryService, LOGIN_FAILED, LOGIN_SUCCESS, LOGOUT_SUCCESS, NO_DIRECTORIES,
    REGISTRATION_SUCCESS,
};
use crate::error::{Error, Result};
use crate::wire::{self, ActiveDirsPayload, TrackerCommand, END_OF_LIST};

/// Listening directory service.
#[derive(Debug)]
pub struct TrackerServer {
    listener: TcpListener,
    service: Arc<DirectoryService>,
}

impl TrackerServer {
    /// Bind the tracker to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, service: Arc<DirectoryService>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Tracker listening on {}", listener.local_addr()?);
        Ok(Self { listener, service })
    }

    /// Address the tracker is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
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
                    tracing::warn!("Tracker accept failed: {}", e);
                    continue;
                }
            };

            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                tracing::debug!("Tracker connection from {}", remote);
                if let Err(e) = handle_connection(service, stream, remote).await {
                    tracing::debug!("Tracker connection {} ended: {}", remote, e);
                }
            });
        }
    }

    /// Run the accept loop on a background task.
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

/// Per-connection state.
struct TrackerConnection {
    service: Arc<DirectoryService>,
    id: ConnectionId,
    remote: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Peer this connection logged in as
    peer_id: Option<u64>,
}

async fn handle_connection(
    service: Arc<DirectoryService>,
    stream: TcpStream,
    remote: SocketAddr,
) -> Result<()> {
    if let Err(e) = wire::configure_tcp_keepalive(&stream) {
        tracing::warn!("Failed to enable keep-alive for {}: {}", remote, e);
    }

    let (read_half, write_half) = stream.into_split();
    let mut conn = TrackerConnection {
        service,
        id: Uuid::new_v4(),
        remote,
        reader: BufReader::new(read_half),
        writer: write_half,
        peer_id: None,
    };

    let result = conn.serve().await;

    if let Some(peer_id) = conn.peer_id.take() {
        conn.service.logout(peer_id, conn.id).await;
    }

    result
}

impl TrackerConnection {
    async fn serve(&mut self) -> Result<()> {
        while let Some(line) = wire::read_line(&mut self.reader, None).await? {
            match TrackerCommand::parse(&line) {
                Ok(command) => self.dispatch(command).await?,
                Err(e) => {
                    tracing::debug!("Rejected tracker request from {}: {:?}", self.remote, e);
                    self.reply(&e.reply()).await?;
                }
            }
        }
        Ok(())
    }

    async fn reply(&mut self, line: &str) -> Result<()> {
        wire::write_line(&mut self.writer, line, None).await
    }

    async fn dispatch(&mut self, command: TrackerCommand) -> Result<()> {
        match command {
            TrackerCommand::Register { username, password } => {
                let reply = match self.service.register_account(&username, &password) {
                    Ok(_) => REGISTRATION_SUCCESS.to_string(),
                    Err(Error::UserExists(name)) => {
                        wire::error_reply(&format!("Username '{name}' already exists."))
                    }
                    Err(e) => {
                        tracing::warn!("Registration of '{}' failed: {}", username, e);
                        wire::error_reply("Registration failed.")
                    }
                };
                self.reply(&reply).await
            }

            TrackerCommand::Login {
                username,
                password,
                ip,
                port,
            } => {
                let declared = SocketAddr::new(ip, port);
                let result = self
                    .service
                    .login(&username, &password, declared, self.remote, self.id)
                    .await;

                let reply = match result {
                    Ok(user) => {
                        if let Some(previous) = self.peer_id.replace(user.id) {
                            if previous != user.id {
                                self.service.logout(previous, self.id).await;
                            }
                        }
                        format!("{LOGIN_SUCCESS} {} {}", user.id, user.username)
                    }
                    Err(e) => {
                        tracing::debug!("{}", e);
                        LOGIN_FAILED.to_string()
                    }
                };
                self.reply(&reply).await
            }

            TrackerCommand::Logout => {
                if let Some(peer_id) = self.peer_id.take() {
                    self.service.logout(peer_id, self.id).await;
                }
                self.reply(LOGOUT_SUCCESS).await
            }

            TrackerCommand::CreateDir { user_id, name } => {
                let reply = if self.peer_id == Some(user_id) {
                    match self.service.create_directory(user_id, &name).await {
                        Ok(_) => format!("Directory '{name}' created."),
                        Err(Error::DirectoryExists(_)) => {
                            wire::error_reply(&format!("Directory '{name}' already exists."))
                        }
                        Err(Error::InvalidPath(_)) => {
                            wire::error_reply(&format!("Invalid directory name '{name}'."))
                        }
                        Err(e) => {
                            tracing::warn!("Creating '{}' for peer {} failed: {}", name, user_id, e);
                            wire::error_reply("Failed to create directory.")
                        }
                    }
                } else {
                    wire::error_reply(&format!("Not logged in as user {user_id}."))
                };
                self.reply(&reply).await
            }

            TrackerCommand::ListDirs { user_id } => match self.service.list_directories(user_id) {
                Ok(dirs) if dirs.is_empty() => {
                    self.reply(NO_DIRECTORIES).await?;
                    self.reply(END_OF_LIST).await
                }
                Ok(dirs) => {
                    for dir in &dirs {
                        let line = format!("{} - {}", dir.name, dir.path.display());
                        self.reply(&line).await?;
                    }
                    self.reply(END_OF_LIST).await
                }
                Err(e) => {
                    tracing::warn!("Listing directories of {} failed: {}", user_id, e);
                    self.reply(&wire::error_reply("Failed to list directories."))
                        .await
                }
            },

            TrackerCommand::GetActiveDirs => {
                let payload = ActiveDirsPayload::new(self.service.list_active().await);
                let json = serde_json::to_string(&payload)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                self.reply(&json).await
            }
        }
    }
}
