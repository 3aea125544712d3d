//! Versioned in-process key-value store with automatic serialization.

use crate::SessionError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// A stored value and the revision it was written at.
#[derive(Debug, Clone)]
struct Entry {
    bytes: Vec<u8>,
    revision: u64,
}

/// Thread-safe key-value store.
///
/// Every write bumps the key's revision, which `compare_and_set` uses to
/// reject writes based on a stale read.
#[derive(Debug, Default)]
pub struct KvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value from the store.
    ///
    /// Returns `None` if the key doesn't exist.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        Ok(self.get_with_revision(key)?.map(|(value, _)| value))
    }

    /// Get a value together with its current revision.
    pub fn get_with_revision<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(T, u64)>, SessionError> {
        let entry = self.lock()?.get(key).cloned();
        match entry {
            Some(entry) => {
                let value: T = serde_json::from_slice(&entry.bytes)?;
                Ok(Some((value, entry.revision)))
            }
            None => Ok(None),
        }
    }

    /// Set a value unconditionally.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec(value)?;
        let mut entries = self.lock()?;
        let revision = entries.get(key).map_or(1, |e| e.revision + 1);
        entries.insert(key.to_string(), Entry { bytes, revision });
        Ok(())
    }

    /// Set a value only if the key is still at `expected` revision.
    ///
    /// `expected = None` means the key must not exist yet. Returns `false`
    /// without writing when another writer got in first.
    pub fn compare_and_set<T: Serialize>(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &T,
    ) -> Result<bool, SessionError> {
        let bytes = serde_json::to_vec(value)?;
        let mut entries = self.lock()?;
        let current = entries.get(key).map(|e| e.revision);
        if current != expected {
            return Ok(false);
        }
        let revision = current.map_or(1, |r| r + 1);
        entries.insert(key.to_string(), Entry { bytes, revision });
        Ok(true)
    }

    /// Delete a value. Deleting a missing key is not an error.
    pub fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.lock()?.remove(key);
        Ok(())
    }

    /// Delete a value only if the key is still at `revision`.
    ///
    /// Returns `false` when the key is gone or was rewritten since.
    pub fn delete_if_revision(&self, key: &str, revision: u64) -> Result<bool, SessionError> {
        let mut entries = self.lock()?;
        if entries.get(key).map(|e| e.revision) != Some(revision) {
            return Ok(false);
        }
        entries.remove(key);
        Ok(true)
    }

    /// Check if a key exists in the store.
    pub fn exists(&self, key: &str) -> Result<bool, SessionError> {
        Ok(self.lock()?.contains_key(key))
    }

    /// Get all keys in the store.
    pub fn keys(&self) -> Result<Vec<String>, SessionError> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    /// Copy every entry out as JSON, for persisting the store between runs.
    pub fn snapshot(&self) -> Result<BTreeMap<String, serde_json::Value>, SessionError> {
        let entries = self.lock()?.clone();
        entries
            .into_iter()
            .map(|(key, entry)| -> Result<_, SessionError> {
                let value: serde_json::Value = serde_json::from_slice(&entry.bytes)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Build a store from a snapshot. Every entry starts at revision 1.
    pub fn restore(snapshot: BTreeMap<String, serde_json::Value>) -> Result<Self, SessionError> {
        let mut entries = HashMap::with_capacity(snapshot.len());
        for (key, value) in snapshot {
            let bytes = serde_json::to_vec(&value)?;
            entries.insert(key, Entry { bytes, revision: 1 });
        }
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, SessionError> {
        self.entries.lock().map_err(|_| SessionError::Poisoned)
    }
}

/// Helper to build store keys with namespacing.
///
/// # Example
///
/// ```rust,ignore
/// let key = store_key!("session", session_id);
/// // Returns "session:sess_abc"
/// ```
#[macro_export]
macro_rules! store_key {
    ($prefix:expr, $($part:expr),+) => {{
        let mut key = String::from($prefix);
        $(
            key.push(':');
            key.push_str(&$part.to_string());
        )+
        key
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let store = KvStore::new();
        store.set("a", &vec![1, 2, 3]).unwrap();
        let value: Option<Vec<i32>> = store.get("a").unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));
        assert!(store.get::<Vec<i32>>("b").unwrap().is_none());
    }

    #[test]
    fn test_revision_increments_on_write() {
        let store = KvStore::new();
        store.set("a", &1).unwrap();
        store.set("a", &2).unwrap();
        let (value, revision) = store.get_with_revision::<i32>("a").unwrap().unwrap();
        assert_eq!(value, 2);
        assert_eq!(revision, 2);
    }

    #[test]
    fn test_compare_and_set_rejects_stale_revision() {
        let store = KvStore::new();
        assert!(store.compare_and_set("a", None, &1).unwrap());
        assert!(!store.compare_and_set("a", None, &2).unwrap());
        assert!(store.compare_and_set("a", Some(1), &3).unwrap());
        assert!(!store.compare_and_set("a", Some(1), &4).unwrap());
        assert_eq!(store.get::<i32>("a").unwrap(), Some(3));
    }

    #[test]
    fn test_delete_and_keys() {
        let store = KvStore::new();
        store.set("b", &1).unwrap();
        store.set("a", &1).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        store.delete("a").unwrap();
        store.delete("missing").unwrap();
        assert!(!store.exists("a").unwrap());
    }

    #[test]
    fn test_delete_if_revision() {
        let store = KvStore::new();
        store.set("a", &1).unwrap();
        store.set("a", &2).unwrap();
        assert!(!store.delete_if_revision("a", 1).unwrap());
        assert!(store.exists("a").unwrap());
        assert!(store.delete_if_revision("a", 2).unwrap());
        assert!(!store.delete_if_revision("a", 2).unwrap());
    }

    #[test]
    fn test_snapshot_restore() {
        let store = KvStore::new();
        store.set("session:a", &vec!["x"]).unwrap();
        let snapshot = store.snapshot().unwrap();

        let restored = KvStore::restore(snapshot).unwrap();
        let (value, revision) = restored
            .get_with_revision::<Vec<String>>("session:a")
            .unwrap()
            .unwrap();
        assert_eq!(value, vec!["x".to_string()]);
        assert_eq!(revision, 1);
    }

    #[test]
    fn test_store_key_macro() {
        assert_eq!(store_key!("session", "abc"), "session:abc");
        assert_eq!(store_key!("cart", "u1", 7), "cart:u1:7");
    }
}
