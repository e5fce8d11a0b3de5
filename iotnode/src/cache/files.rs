//! Cache directory layout.
//!
//! Each cached item is a regular file named by its content key directly in
//! the cache directory. A download in progress writes `<key>.partial` next to
//! it. Subdirectories (the `log/` directory in particular), partial files and
//! names that cannot be a content key are never part of the cache.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use tracing::debug;

/// Suffix of in-progress download files.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// A cached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// The on-disk cache directory.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the cache directory if it doesn't exist.
    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Whether `key` can name a cache file: a single path component that is
    /// not itself a partial file.
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0'])
            && !key.ends_with(PARTIAL_SUFFIX)
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn partial_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{PARTIAL_SUFFIX}"))
    }

    /// Whether the final file for `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        Self::is_valid_key(key) && self.path(key).is_file()
    }

    /// Set the file's modification time to now.
    ///
    /// Returns `false` if the file isn't cached.
    pub fn touch(&self, key: &str) -> io::Result<bool> {
        if !self.contains(key) {
            return Ok(false);
        }
        filetime::set_file_mtime(self.path(key), FileTime::now())?;
        Ok(true)
    }

    /// All cached files, ordered by key.
    ///
    /// A missing cache directory is an empty cache.
    pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for entry in dir.flatten() {
            let Ok(key) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 cache file name");
                continue;
            };
            if key.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            if !Self::is_valid_key(&key) {
                debug!(path = %entry.path().display(), "Skipping file that is not a cache key");
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            entries.push(CacheEntry {
                path: entry.path(),
                key,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Total bytes of all cached files.
    pub fn size(&self) -> io::Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.size).sum())
    }

    /// Delete a cached file, returning the bytes freed.
    ///
    /// A file that is already gone frees nothing.
    pub fn remove(&self, key: &str) -> io::Result<u64> {
        if !Self::is_valid_key(key) {
            return Ok(0);
        }
        let path = self.path(key);
        let size = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(size),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }
}
