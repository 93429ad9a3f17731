//! Named cache stores and the in-memory backend

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::http::Response;

/// Errors raised by a cache storage backend
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem read/write failure
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("Cache entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store name that cannot be used as a storage location
    #[error("Invalid cache store name: '{0}'")]
    InvalidStoreName(String),

    /// A previous panic left the storage lock poisoned
    #[error("Cache storage lock poisoned")]
    Poisoned,
}

/// Process-wide collection of named stores mapping request keys to responses
///
/// Writes to the same key are serialized by the backend; the last writer wins.
pub trait CacheStorage: Send + Sync {
    /// Names of all existing stores
    fn store_names(&self) -> Result<Vec<String>, CacheError>;

    /// Creates the store if it does not exist yet
    fn open(&self, store: &str) -> Result<(), CacheError>;

    fn get(&self, store: &str, key: &str) -> Result<Option<Response>, CacheError>;

    /// Inserts or replaces the entry, creating the store on demand
    fn put(&self, store: &str, key: &str, response: &Response) -> Result<(), CacheError>;

    /// Request keys held by the store (empty when the store is absent)
    fn keys(&self, store: &str) -> Result<Vec<String>, CacheError>;

    /// Returns whether an entry was removed
    fn remove(&self, store: &str, key: &str) -> Result<bool, CacheError>;

    /// Returns whether a store was deleted
    fn delete_store(&self, store: &str) -> Result<bool, CacheError>;
}

/// Rejects names that would escape a storage root or be ambiguous
pub(crate) fn validate_store_name(store: &str) -> Result<(), CacheError> {
    let valid = !store.is_empty()
        && store != "."
        && store != ".."
        && store
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidStoreName(store.to_string()))
    }
}

/// Storage kept entirely in memory, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, HashMap<String, Response>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn store_names(&self) -> Result<Vec<String>, CacheError> {
        let stores = self.stores.read().map_err(|_| CacheError::Poisoned)?;
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, store: &str) -> Result<(), CacheError> {
        validate_store_name(store)?;
        let mut stores = self.stores.write().map_err(|_| CacheError::Poisoned)?;
        stores.entry(store.to_string()).or_default();
        Ok(())
    }

    fn get(&self, store: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let stores = self.stores.read().map_err(|_| CacheError::Poisoned)?;
        Ok(stores.get(store).and_then(|entries| entries.get(key)).cloned())
    }

    fn put(&self, store: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        validate_store_name(store)?;
        let mut stores = self.stores.write().map_err(|_| CacheError::Poisoned)?;
        stores
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    fn keys(&self, store: &str) -> Result<Vec<String>, CacheError> {
        let stores = self.stores.read().map_err(|_| CacheError::Poisoned)?;
        let mut keys: Vec<String> = stores
            .get(store)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, store: &str, key: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().map_err(|_| CacheError::Poisoned)?;
        Ok(stores
            .get_mut(store)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false))
    }

    fn delete_store(&self, store: &str) -> Result<bool, CacheError> {
        let mut stores = self.stores.write().map_err(|_| CacheError::Poisoned)?;
        Ok(stores.remove(store).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_none_for_missing_store_or_key() {
        let storage = MemoryStorage::new();
        assert!(storage.get("shell", "GET /").unwrap().is_none());

        storage.open("shell").unwrap();
        assert!(storage.get("shell", "GET /").unwrap().is_none());
    }

    #[test]
    fn test_put_creates_store_and_overwrites() {
        let storage = MemoryStorage::new();
        storage.put("api", "GET /q", &Response::ok("first")).unwrap();
        storage.put("api", "GET /q", &Response::ok("second")).unwrap();

        assert_eq!(storage.store_names().unwrap(), vec!["api".to_string()]);
        let entry = storage.get("api", "GET /q").unwrap().unwrap();
        assert_eq!(entry.body_text(), "second");
    }

    #[test]
    fn test_keys_and_remove() {
        let storage = MemoryStorage::new();
        storage.put("api", "GET /b", &Response::ok("")).unwrap();
        storage.put("api", "GET /a", &Response::ok("")).unwrap();

        assert_eq!(storage.keys("api").unwrap(), vec!["GET /a", "GET /b"]);
        assert!(storage.remove("api", "GET /a").unwrap());
        assert!(!storage.remove("api", "GET /a").unwrap());
        assert!(storage.keys("missing").unwrap().is_empty());
    }

    #[test]
    fn test_delete_store() {
        let storage = MemoryStorage::new();
        storage.open("shell-v1").unwrap();

        assert!(storage.delete_store("shell-v1").unwrap());
        assert!(!storage.delete_store("shell-v1").unwrap());
        assert!(storage.store_names().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_store_names_are_rejected() {
        let storage = MemoryStorage::new();
        for name in ["", "..", "a/b", "shell v1"] {
            assert!(matches!(
                storage.open(name),
                Err(CacheError::InvalidStoreName(_))
            ));
        }
    }
}
