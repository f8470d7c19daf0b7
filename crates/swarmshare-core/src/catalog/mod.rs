//! Persisted catalog of user accounts and shared directories.
//!
//! The tracker only talks to the catalog through the [`Catalog`] trait.
//! [`CatalogStore`] is the bundled implementation: it keeps everything in
//! memory and, when opened on a path, rewrites a JSON file after every
//! mutation.
//!
//! ## Features
//!
//! - Unique usernames, ids assigned monotonically from 1
//! - Passwords are only ever stored as SHA-256 hex digests
//! - Directory records are immutable once created

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable numeric id
    pub id: u64,
    /// Unique username
    pub username: String,
    /// SHA-256 hex digest of the password
    pub password_hash: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// A declared shared directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDirectory {
    /// Owning user id
    pub owner_id: u64,
    /// Directory name
    pub name: String,
    /// Absolute path on the owner's machine
    pub path: PathBuf,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Lookup interface the tracker needs from persistent storage.
pub trait Catalog: Send + Sync {
    /// Create a user account.
    ///
    /// # Errors
    ///
    /// Returns `Error::UserExists` if the username is taken.
    fn register_user(&self, username: &str, password_hash: &str) -> Result<UserRecord>;

    /// Find the user matching both username and password digest.
    fn get_user(&self, username: &str, password_hash: &str) -> Result<Option<UserRecord>>;

    /// Record a shared directory.
    fn add_directory(&self, owner_id: u64, name: &str, path: &Path) -> Result<SharedDirectory>;

    /// All directories owned by a user, in creation order.
    fn user_directories(&self, owner_id: u64) -> Result<Vec<SharedDirectory>>;
}

/// Hash a password the way the catalog stores it (SHA-256, lowercase hex).
#[must_use]
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serializable catalog contents.
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDatabase {
    /// Format version
    version: u32,
    /// Next id handed out by `register_user`
    next_user_id: u64,
    /// Registered users
    users: Vec<UserRecord>,
    /// Declared directories
    directories: Vec<SharedDirectory>,
}

impl Default for CatalogDatabase {
    fn default() -> Self {
        Self {
            version: 1,
            next_user_id: 1,
            users: Vec::new(),
            directories: Vec::new(),
        }
    }
}

/// In-memory catalog with optional JSON persistence.
#[derive(Debug)]
pub struct CatalogStore {
    /// Backing file (None = memory only)
    path: Option<PathBuf>,
    db: Mutex<CatalogDatabase>,
}

impl CatalogStore {
    /// A catalog that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            db: Mutex::new(CatalogDatabase::default()),
        }
    }

    /// Open (or start) a catalog persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path),
                db: Mutex::new(CatalogDatabase::default()),
            });
        }

        let file = fs::File::open(&path).map_err(|e| {
            Error::CatalogError(format!(
                "Failed to open catalog at {}: {}",
                path.display(),
                e
            ))
        })?;

        let db: CatalogDatabase = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::CatalogError(format!(
                "Failed to parse catalog at {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "Loaded catalog with {} users and {} directories",
            db.users.len(),
            db.directories.len()
        );

        Ok(Self {
            path: Some(path),
            db: Mutex::new(db),
        })
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, CatalogDatabase>> {
        self.db
            .lock()
            .map_err(|_| Error::CatalogError("catalog lock poisoned".to_string()))
    }

    fn save(&self, db: &CatalogDatabase) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::CatalogError(format!(
                    "Failed to create catalog directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = fs::File::create(path).map_err(|e| {
            Error::CatalogError(format!(
                "Failed to create catalog at {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::to_writer_pretty(BufWriter::new(file), db).map_err(|e| {
            Error::CatalogError(format!(
                "Failed to write catalog at {}: {}",
                path.display(),
                e
            ))
        })
    }
}

impl Catalog for CatalogStore {
    fn register_user(&self, username: &str, password_hash: &str) -> Result<UserRecord> {
        let mut db = self.lock()?;

        if db.users.iter().any(|u| u.username == username) {
            return Err(Error::UserExists(username.to_string()));
        }

        let user = UserRecord {
            id: db.next_user_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        db.next_user_id += 1;
        db.users.push(user.clone());
        self.save(&db)?;

        tracing::info!("Registered user '{}' with id {}", user.username, user.id);
        Ok(user)
    }

    fn get_user(&self, username: &str, password_hash: &str) -> Result<Option<UserRecord>> {
        let db = self.lock()?;
        Ok(db
            .users
            .iter()
            .find(|u| u.username == username && u.password_hash == password_hash)
            .cloned())
    }

    fn add_directory(&self, owner_id: u64, name: &str, path: &Path) -> Result<SharedDirectory> {
        let mut db = self.lock()?;

        let directory = SharedDirectory {
            owner_id,
            name: name.to_string(),
            path: path.to_path_buf(),
            created_at: Utc::now(),
        };
        db.directories.push(directory.clone());
        self.save(&db)?;

        Ok(directory)
    }

    fn user_directories(&self, owner_id: u64) -> Result<Vec<SharedDirectory>> {
        let db = self.lock()?;
        Ok(db
            .directories
            .iter()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_password() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(hash_password("pw1"), hash_password("pw2"));
    }

    #[test]
    fn test_register_and_get_user() {
        let catalog = CatalogStore::in_memory();

        let alice = catalog
            .register_user("alice", &hash_password("pw1"))
            .expect("register alice");
        let bob = catalog
            .register_user("bob", &hash_password("pw2"))
            .expect("register bob");

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);

        let found = catalog
            .get_user("alice", &hash_password("pw1"))
            .unwrap()
            .expect("alice found");
        assert_eq!(found.id, alice.id);

        assert!(catalog
            .get_user("alice", &hash_password("wrong"))
            .unwrap()
            .is_none());
        assert!(catalog
            .get_user("carol", &hash_password("pw1"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicate_username_rejected() {
        let catalog = CatalogStore::in_memory();
        catalog.register_user("alice", "h1").unwrap();

        let err = catalog.register_user("alice", "h2").unwrap_err();
        assert!(matches!(err, Error::UserExists(ref name) if name == "alice"));
    }

    #[test]
    fn test_user_directories_filtered_by_owner() {
        let catalog = CatalogStore::in_memory();
        catalog
            .add_directory(1, "music", Path::new("/srv/1/music"))
            .unwrap();
        catalog
            .add_directory(2, "docs", Path::new("/srv/2/docs"))
            .unwrap();
        catalog
            .add_directory(1, "video", Path::new("/srv/1/video"))
            .unwrap();

        let dirs = catalog.user_directories(1).unwrap();
        let names: Vec<&str> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["music", "video"]);
        assert!(catalog.user_directories(9).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("nested/catalog.json");

        {
            let catalog = CatalogStore::open(path.clone()).expect("open");
            catalog.register_user("alice", "h").unwrap();
            catalog
                .add_directory(1, "music", Path::new("/srv/1/music"))
                .unwrap();
        }

        let reopened = CatalogStore::open(path).expect("reopen");
        assert!(reopened.get_user("alice", "h").unwrap().is_some());
        assert_eq!(reopened.user_directories(1).unwrap().len(), 1);

        let bob = reopened.register_user("bob", "h").unwrap();
        assert_eq!(bob.id, 2, "ids keep counting after reload");
    }

    #[test]
    fn test_open_corrupt_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join("catalog.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            CatalogStore::open(path),
            Err(Error::CatalogError(_))
        ));
    }
}
