//! Directory service ("tracker") for swarmshare.
//!
//! The tracker knows which peers are online, where their peer listeners
//! are, and which directories they share. It never carries file data.
//!
//! - [`PresenceRegistry`] holds the live sessions
//! - [`DirectoryService`] joins presence with the [`Catalog`]
//! - [`TrackerServer`] exposes the service over TCP
//! - [`TrackerClient`] is the peer side of that connection
//!
//! A peer stays online for as long as the tracker connection it logged in
//! on stays open.

pub mod client;
pub mod registry;
pub mod server;

pub use client::{LoginSession, TrackerClient};
pub use registry::{ConnectionId, PeerSession, PresenceRegistry};
pub use server::TrackerServer;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::{hash_password, Catalog, SharedDirectory, UserRecord};
use crate::error::{Error, Result};
use crate::wire::{ActivePeer, DirectoryEntry};

/// Reply to a successful REGISTER.
pub const REGISTRATION_SUCCESS: &str = "Registration successful.";

/// Prefix of a successful LOGIN reply, followed by `<id> <username>`.
pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";

/// Reply to a rejected LOGIN.
pub const LOGIN_FAILED: &str = "LOGIN_FAILED";

/// Reply to LOGOUT.
pub const LOGOUT_SUCCESS: &str = "LOGOUT_SUCCESS";

/// LIST_DIRS line for a user without directories.
pub const NO_DIRECTORIES: &str = "No directories found.";

/// Presence registry joined with the persisted catalog.
pub struct DirectoryService {
    registry: PresenceRegistry,
    catalog: Arc<dyn Catalog>,
    shared_root: PathBuf,
    trust_declared_address: bool,
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("registry", &self.registry)
            .field("shared_root", &self.shared_root)
            .field("trust_declared_address", &self.trust_declared_address)
            .finish_non_exhaustive()
    }
}

impl DirectoryService {
    /// Create a service over `catalog`, creating shared directories under
    /// `shared_root`.
    #[must_use]
    pub fn new(catalog: Arc<dyn Catalog>, shared_root: PathBuf) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            catalog,
            shared_root,
            trust_declared_address: true,
        }
    }

    /// Choose whether login stores the declared ip (default) or the ip the
    /// connection was observed from.
    #[must_use]
    pub fn with_trust_declared_address(mut self, trust: bool) -> Self {
        self.trust_declared_address = trust;
        self
    }

    /// The live presence registry.
    #[must_use]
    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `Error::UserExists` for a taken username, or a catalog error.
    pub fn register_account(&self, username: &str, password: &str) -> Result<UserRecord> {
        self.catalog
            .register_user(username, &hash_password(password))
    }

    /// Validate credentials and put the peer online.
    ///
    /// `observed` is the remote address of the tracker connection; it only
    /// matters when declared addresses are not trusted.
    ///
    /// # Errors
    ///
    /// Returns `Error::LoginFailed` for bad credentials or a failing catalog.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        declared: SocketAddr,
        observed: SocketAddr,
        connection: ConnectionId,
    ) -> Result<UserRecord> {
        let user = match self.catalog.get_user(username, &hash_password(password)) {
            Ok(Some(user)) => user,
            Ok(None) => return Err(Error::LoginFailed(username.to_string())),
            Err(e) => {
                tracing::warn!("Catalog lookup failed during login of '{}': {}", username, e);
                return Err(Error::LoginFailed(username.to_string()));
            }
        };

        let ip: IpAddr = if self.trust_declared_address {
            declared.ip()
        } else {
            if declared.ip() != observed.ip() {
                tracing::info!(
                    "Peer {} declared {} but connected from {}; using observed address",
                    user.id,
                    declared.ip(),
                    observed.ip()
                );
            }
            observed.ip()
        };

        self.registry
            .register(user.id, ip, declared.port(), connection)
            .await;
        tracing::info!("Peer {} ({}) online at {}:{}", user.id, user.username, ip, declared.port());

        Ok(user)
    }

    /// Take a peer offline, if `connection` still owns its session.
    pub async fn logout(&self, peer_id: u64, connection: ConnectionId) -> bool {
        let removed = self.registry.deregister(peer_id, connection).await;
        if removed {
            tracing::info!("Peer {} offline", peer_id);
        }
        removed
    }

    /// Create `<shared_root>/<user_id>/<name>` on disk and record it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPath` for a bad name, `Error::DirectoryExists`
    /// if the path already exists, or an I/O / catalog error.
    pub async fn create_directory(&self, user_id: u64, name: &str) -> Result<SharedDirectory> {
        crate::file::validate_dir_name(name)?;

        let path = self.shared_root.join(user_id.to_string()).join(name);
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::DirectoryExists(name.to_string()));
        }
        tokio::fs::create_dir_all(&path).await?;

        let directory = self.catalog.add_directory(user_id, name, &path)?;
        tracing::info!("Peer {} shares '{}' at {}", user_id, name, path.display());
        Ok(directory)
    }

    /// Directories declared by a user.
    ///
    /// # Errors
    ///
    /// Returns a catalog error.
    pub fn list_directories(&self, user_id: u64) -> Result<Vec<SharedDirectory>> {
        self.catalog.user_directories(user_id)
    }

    /// Every online peer with its shared directories.
    ///
    /// A peer whose directories cannot be loaded is still listed, with an
    /// empty directory list.
    pub async fn list_active(&self) -> Vec<ActivePeer> {
        let sessions = self.registry.snapshot().await;

        sessions
            .into_iter()
            .map(|session| {
                let directories = match self.catalog.user_directories(session.peer_id) {
                    Ok(dirs) => dirs.iter().map(DirectoryEntry::from).collect(),
                    Err(e) => {
                        tracing::warn!(
                            "Could not load directories of peer {}: {}",
                            session.peer_id,
                            e
                        );
                        Vec::new()
                    }
                };
                ActivePeer {
                    user_id: session.peer_id,
                    ip: session.ip,
                    port: session.port,
                    directories,
                }
            })
            .collect()
    }
}

impl From<&SharedDirectory> for DirectoryEntry {
    fn from(dir: &SharedDirectory) -> Self {
        Self {
            name: dir.name.clone(),
            path: dir.path.to_string_lossy().into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogStore;
    use std::path::Path;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Catalog whose directory lookups fail for one user.
    struct FlakyCatalog {
        inner: CatalogStore,
        broken_user: u64,
    }

    impl Catalog for FlakyCatalog {
        fn register_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
            self.inner.register_user(username, password_hash)
        }

        fn get_user(&self, username: &str, password_hash: &str) -> Result<Option<UserRecord>> {
            self.inner.get_user(username, password_hash)
        }

        fn add_directory(
            &self,
            owner_id: u64,
            name: &str,
            path: &Path,
        ) -> Result<SharedDirectory> {
            self.inner.add_directory(owner_id, name, path)
        }

        fn user_directories(&self, owner_id: u64) -> Result<Vec<SharedDirectory>> {
            if owner_id == self.broken_user {
                return Err(Error::CatalogError("disk on fire".to_string()));
            }
            self.inner.user_directories(owner_id)
        }
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn service(temp_dir: &TempDir) -> DirectoryService {
        DirectoryService::new(
            Arc::new(CatalogStore::in_memory()),
            temp_dir.path().to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_login_flow() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let alice = service.register_account("alice", "pw1").unwrap();
        let conn = Uuid::new_v4();

        let user = service
            .login("alice", "pw1", addr("10.0.0.5:6001"), addr("10.0.0.5:40000"), conn)
            .await
            .expect("login");
        assert_eq!(user.id, alice.id);

        let err = service
            .login("alice", "nope", addr("10.0.0.5:6001"), addr("10.0.0.5:40000"), conn)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LoginFailed(_)));

        assert_eq!(service.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_observed_address_when_declared_untrusted() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir).with_trust_declared_address(false);
        service.register_account("mallory", "pw").unwrap();

        let user = service
            .login(
                "mallory",
                "pw",
                addr("8.8.8.8:6001"),
                addr("192.168.0.44:50123"),
                Uuid::new_v4(),
            )
            .await
            .unwrap();

        let session = service.registry().get(user.id).await.unwrap();
        assert_eq!(session.addr(), addr("192.168.0.44:6001"));
    }

    #[tokio::test]
    async fn test_list_active_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(service(&temp_dir).list_active().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_active_survives_catalog_failure() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = FlakyCatalog {
            inner: CatalogStore::in_memory(),
            broken_user: 2,
        };
        let service = DirectoryService::new(Arc::new(catalog), temp_dir.path().to_path_buf());

        service.register_account("alice", "a").unwrap();
        service.register_account("bob", "b").unwrap();
        service.create_directory(1, "music").await.unwrap();
        service.create_directory(2, "docs").await.unwrap();

        service
            .login("alice", "a", addr("10.0.0.1:6001"), addr("10.0.0.1:1"), Uuid::new_v4())
            .await
            .unwrap();
        service
            .login("bob", "b", addr("10.0.0.2:6002"), addr("10.0.0.2:1"), Uuid::new_v4())
            .await
            .unwrap();

        let active = service.list_active().await;
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].user_id, 1);
        assert_eq!(active[0].directories.len(), 1);
        assert_eq!(active[1].user_id, 2);
        assert!(active[1].directories.is_empty());
    }

    #[tokio::test]
    async fn test_create_directory() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);

        let dir = service.create_directory(3, "photos").await.unwrap();
        assert_eq!(dir.path, temp_dir.path().join("3").join("photos"));
        assert!(dir.path.is_dir());

        let err = service.create_directory(3, "photos").await.unwrap_err();
        assert!(matches!(err, Error::DirectoryExists(_)));

        let err = service.create_directory(3, "../escape").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));

        assert_eq!(service.list_directories(3).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_logout_requires_owning_connection() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        service.register_account("alice", "pw").unwrap();

        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        service
            .login("alice", "pw", addr("10.0.0.1:6001"), addr("10.0.0.1:1"), old)
            .await
            .unwrap();
        service
            .login("alice", "pw", addr("10.0.0.1:6002"), addr("10.0.0.1:2"), new)
            .await
            .unwrap();

        assert!(!service.logout(1, old).await);
        assert!(service.logout(1, new).await);
        assert!(service.registry().is_empty().await);
    }
}
