//! File operations for swarmshare.
//!
//! This module handles:
//! - Listing the regular files directly inside a shared directory
//! - Opening byte ranges of a file for streaming
//! - Path sanitization for directory names
//! - Download area layout

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Error, Result};
use crate::wire::FileEntry;

/// A regular file found in a shared directory at request time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedFile {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl From<&SharedFile> for FileEntry {
    fn from(file: &SharedFile) -> Self {
        Self {
            name: file.name.clone(),
            path: file.path.to_string_lossy().into_owned(),
        }
    }
}

/// List the regular files directly inside `dir`.
///
/// Subdirectories are skipped, and so are entries whose names are not valid
/// UTF-8. Symlinks are followed. Results are sorted by name.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `dir` is not a readable directory.
pub fn list_shared_files(dir: &Path) -> Result<Vec<SharedFile>> {
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.display().to_string()));
    }

    let walker = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker.into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        files.push(SharedFile {
            name: name.to_string(),
            path: entry.path().to_path_buf(),
            size: metadata.len(),
        });
    }

    Ok(files)
}

/// Size of a regular file, or `None` if `path` is not one.
pub async fn file_size(path: &Path) -> Option<u64> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    metadata.is_file().then(|| metadata.len())
}

/// Open the inclusive byte range `[start, end]` of a file for reading.
///
/// The range is clamped to the end of the file: a range that runs past the
/// end yields the bytes that exist, and a range that starts past the end (or
/// with `start > end`) yields nothing. Returns the reader and the number of
/// bytes it will produce.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `path` is not a regular file.
pub async fn open_range(
    path: &Path,
    start: u64,
    end: u64,
) -> Result<(tokio::io::Take<tokio::fs::File>, u64)> {
    let size = file_size(path)
        .await
        .ok_or_else(|| Error::FileNotFound(path.display().to_string()))?;

    let len = clamp_range(size, start, end);
    let mut file = tokio::fs::File::open(path).await?;
    if len > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    Ok((file.take(len), len))
}

/// Number of bytes the inclusive range `[start, end]` covers in a file of
/// `size` bytes.
#[must_use]
pub fn clamp_range(size: u64, start: u64, end: u64) -> u64 {
    if start > end || start >= size {
        return 0;
    }
    end.min(size - 1) - start + 1
}

/// Validate a file name: a single normal path component.
///
/// # Errors
///
/// Returns `Error::InvalidPath` for empty names, separators, `.` or `..`.
pub fn validate_file_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(Error::InvalidPath(name.to_string())),
    }
}

/// Validate a shared directory name.
///
/// Same rules as [`validate_file_name`], and no whitespace: directory names
/// travel as one token in tracker requests.
///
/// # Errors
///
/// Returns `Error::InvalidPath` if the name is rejected.
pub fn validate_dir_name(name: &str) -> Result<()> {
    if name.contains(char::is_whitespace) {
        return Err(Error::InvalidPath(name.to_string()));
    }
    validate_file_name(name)
}

/// Download area of a local peer: `<root>/<peer_id>/download`.
#[must_use]
pub fn download_dir(root: &Path, peer_id: u64) -> PathBuf {
    root.join(peer_id.to_string()).join("download")
}

/// Format a file size for display.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
