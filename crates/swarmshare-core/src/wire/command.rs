//! Request lines of the peer and tracker protocols.

use std::fmt;
use std::net::IpAddr;

/// Why a request line could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Blank line
    Empty,
    /// Command word not recognised
    Unknown(String),
    /// Known command with missing or malformed arguments
    Invalid(String),
}

impl CommandError {
    /// The error reply to send back for this failure.
    #[must_use]
    pub fn reply(&self) -> String {
        match self {
            Self::Empty | Self::Unknown(_) => super::error_reply("Unknown command"),
            Self::Invalid(reason) => super::error_reply(reason),
        }
    }
}

/// A Peer Transfer Protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    /// List the regular files directly inside a directory
    ListFile {
        /// Directory path
        path: String,
    },
    /// Size of a file in bytes
    GetFileSize {
        /// File path
        path: String,
    },
    /// Whole file contents
    DownloadFile {
        /// File path
        path: String,
    },
    /// Bytes of the inclusive range `[start, end]`
    DownloadChunk {
        /// File path
        path: String,
        /// First byte offset
        start: u64,
        /// Last byte offset (inclusive)
        end: u64,
    },
}

impl PeerCommand {
    /// Parse a request line.
    ///
    /// Single-path commands take the rest of the line as the path, so paths
    /// may contain spaces. `DOWNLOAD_CHUNK` takes its range from the last two
    /// tokens.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing the rejected line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandError::Empty);
        }

        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let path = || {
            if rest.is_empty() {
                Err(CommandError::Invalid(format!("Invalid arguments for {word}")))
            } else {
                Ok(rest.to_string())
            }
        };

        match word {
            "LIST_FILE" => Ok(Self::ListFile { path: path()? }),
            "GET_FILE_SIZE" => Ok(Self::GetFileSize { path: path()? }),
            "DOWNLOAD_FILE" => Ok(Self::DownloadFile { path: path()? }),
            "DOWNLOAD_CHUNK" => {
                let invalid = || CommandError::Invalid(format!("Invalid arguments for {word}"));
                let mut parts = rest.rsplitn(3, ' ');
                let end = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
                let start = parts.next().and_then(|s| s.parse().ok()).ok_or_else(invalid)?;
                let path = parts
                    .next()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(invalid)?;
                Ok(Self::DownloadChunk {
                    path: path.to_string(),
                    start,
                    end,
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    /// Command word, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ListFile { .. } => "LIST_FILE",
            Self::GetFileSize { .. } => "GET_FILE_SIZE",
            Self::DownloadFile { .. } => "DOWNLOAD_FILE",
            Self::DownloadChunk { .. } => "DOWNLOAD_CHUNK",
        }
    }
}

impl fmt::Display for PeerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ListFile { path } | Self::GetFileSize { path } | Self::DownloadFile { path } => {
                write!(f, "{} {path}", self.name())
            }
            Self::DownloadChunk { path, start, end } => {
                write!(f, "{} {path} {start} {end}", self.name())
            }
        }
    }
}

/// A Directory Service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerCommand {
    /// Create a user account
    Register {
        /// Username
        username: String,
        /// Plain-text password
        password: String,
    },
    /// Authenticate and announce the peer listener address
    Login {
        /// Username
        username: String,
        /// Plain-text password
        password: String,
        /// Declared peer listener ip
        ip: IpAddr,
        /// Declared peer listener port
        port: u16,
    },
    /// Drop the presence session of this connection
    Logout,
    /// Declare a new shared directory
    CreateDir {
        /// Owner id
        user_id: u64,
        /// Directory name
        name: String,
    },
    /// List a user's shared directories
    ListDirs {
        /// Owner id
        user_id: u64,
    },
    /// Online peers with their shared directories
    GetActiveDirs,
}

impl TrackerCommand {
    /// Parse a request line (whitespace separated tokens).
    ///
    /// Every command takes an exact number of arguments; surplus tokens are
    /// rejected rather than ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] describing the rejected line.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(word) = tokens.next() else {
            return Err(CommandError::Empty);
        };
        let args: Vec<&str> = tokens.collect();

        match word {
            "REGISTER" => match args.as_slice() {
                [username, password] => Ok(Self::Register {
                    username: (*username).to_string(),
                    password: (*password).to_string(),
                }),
                [_, _, _, ..] => Err(extra(word)),
                _ => Err(invalid("Missing registration info.")),
            },
            "LOGIN" => match args.as_slice() {
                [username, password, ip, port] => Ok(Self::Login {
                    username: (*username).to_string(),
                    password: (*password).to_string(),
                    ip: ip.parse().map_err(|_| invalid("Invalid login address."))?,
                    port: port.parse().map_err(|_| invalid("Invalid login port."))?,
                }),
                [_, _, _, _, _, ..] => Err(extra(word)),
                _ => Err(invalid("Missing login info.")),
            },
            "LOGOUT" => match args.as_slice() {
                [] => Ok(Self::Logout),
                _ => Err(extra(word)),
            },
            "CREATE_DIR" => match args.as_slice() {
                [user_id, name] => Ok(Self::CreateDir {
                    user_id: user_id.parse().map_err(|_| invalid("Invalid user ID."))?,
                    name: (*name).to_string(),
                }),
                [_, _, _, ..] => Err(extra(word)),
                _ => Err(invalid("Missing directory info.")),
            },
            "LIST_DIRS" => match args.as_slice() {
                [user_id] => Ok(Self::ListDirs {
                    user_id: user_id.parse().map_err(|_| invalid("Invalid user ID."))?,
                }),
                [] => Err(invalid("Missing user ID.")),
                _ => Err(extra(word)),
            },
            "GET_ACTIVE_DIRS" => match args.as_slice() {
                [] => Ok(Self::GetActiveDirs),
                _ => Err(extra(word)),
            },
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn invalid(reason: &str) -> CommandError {
    CommandError::Invalid(reason.to_string())
}

fn extra(word: &str) -> CommandError {
    CommandError::Invalid(format!("Invalid arguments for {word}"))
}

impl fmt::Display for TrackerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { username, password } => write!(f, "REGISTER {username} {password}"),
            Self::Login {
                username,
                password,
                ip,
                port,
            } => write!(f, "LOGIN {username} {password} {ip} {port}"),
            Self::Logout => write!(f, "LOGOUT"),
            Self::CreateDir { user_id, name } => write!(f, "CREATE_DIR {user_id} {name}"),
            Self::ListDirs { user_id } => write!(f, "LIST_DIRS {user_id}"),
            Self::GetActiveDirs => write!(f, "GET_ACTIVE_DIRS"),
        }
    }
}
