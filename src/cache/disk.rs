//! Cache stores persisted to disk
//!
//! Each named store is a sub-directory of the cache root. Entries are JSON
//! files named by the SHA-256 of their request key, so arbitrary URLs map to
//! safe file names while the key itself is kept inside the file.

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::storage::{validate_store_name, CacheError, CacheStorage};
use crate::http::Response;

/// Distinguishes temporary files of concurrent writers within this process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Wrapper struct for a response stored on disk
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    /// Request key the response was stored under
    key: String,
    /// The stored response
    response: Response,
    /// When the file was written
    written_at: DateTime<Utc>,
}

/// Stores cache entries as JSON files under an XDG-compliant cache directory
///
/// Uses `~/.cache/cbtkit/` on Linux. Writes go to a temporary file that is
/// renamed into place, so a reader never sees a half-written entry.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    /// Directory holding one sub-directory per store
    root: PathBuf,
}

impl DiskStorage {
    /// Creates a DiskStorage in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "cbtkit")?;
        Some(Self {
            root: project_dirs.cache_dir().join("stores"),
        })
    }

    /// Creates a DiskStorage rooted at a custom directory
    pub fn with_dir(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn store_dir(&self, store: &str) -> Result<PathBuf, CacheError> {
        validate_store_name(store)?;
        Ok(self.root.join(store))
    }

    fn entry_path(&self, store: &str, key: &str) -> Result<PathBuf, CacheError> {
        let digest = Sha256::digest(key.as_bytes());
        Ok(self
            .store_dir(store)?
            .join(format!("{}.json", hex::encode(digest))))
    }

    /// Unique sibling of `path`; the `.tmp` extension keeps it out of `keys`
    fn tmp_path(path: &Path) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.with_extension(format!("{}.{}.tmp", std::process::id(), n))
    }

    fn read_entry(path: &Path) -> Result<Option<DiskEntry>, CacheError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CacheStorage for DiskStorage {
    fn store_names(&self) -> Result<Vec<String>, CacheError> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in read_dir {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, store: &str) -> Result<(), CacheError> {
        fs::create_dir_all(self.store_dir(store)?)?;
        Ok(())
    }

    fn get(&self, store: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let path = self.entry_path(store, key)?;
        Ok(Self::read_entry(&path)?
            .filter(|entry| entry.key == key)
            .map(|entry| entry.response))
    }

    fn put(&self, store: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        self.open(store)?;

        let entry = DiskEntry {
            key: key.to_string(),
            response: response.clone(),
            written_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry)?;

        let path = self.entry_path(store, key)?;
        let tmp = Self::tmp_path(&path);
        let written = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, &path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(written?)
    }

    fn keys(&self, store: &str) -> Result<Vec<String>, CacheError> {
        let dir = self.store_dir(store)?;
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in read_dir {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // Unreadable files are skipped rather than failing the listing
            if let Ok(Some(disk_entry)) = Self::read_entry(&path) {
                keys.push(disk_entry.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, store: &str, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.entry_path(store, key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_store(&self, store: &str) -> Result<bool, CacheError> {
        match fs::remove_dir_all(self.store_dir(store)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
