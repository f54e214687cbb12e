//! Property storage behind the test station.
//!
//! The station's dispatch layer talks to a [`PropertyStore`] trait so the
//! backing map is swappable; the in-memory implementation here is all the
//! test station needs. Values are stored as raw wire bytes; typed
//! interpretation stays in the protocol layer.

use std::collections::HashMap;
use std::sync::Mutex;

use acp_proto::property::PropName;
use bytes::Bytes;
use thiserror::Error;

/// Errors from a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed; the station answers the property as
    /// unavailable.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Key/value storage for property bytes.
pub trait PropertyStore: Send + Sync + 'static {
    /// Read a property. `None` means the name has no value here.
    fn get(&self, name: PropName) -> Result<Option<Bytes>, StoreError>;

    /// Write a property.
    fn set(&self, name: PropName, value: Bytes) -> Result<(), StoreError>;
}

/// Hash-map store used by the test station.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<PropName, Bytes>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    #[must_use]
    pub fn seeded(entries: impl IntoIterator<Item = (PropName, Bytes)>) -> Self {
        Self { entries: Mutex::new(entries.into_iter().collect()) }
    }
}

impl PropertyStore for MemoryStore {
    fn get(&self, name: PropName) -> Result<Option<Bytes>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        Ok(entries.get(&name).cloned())
    }

    fn set(&self, name: PropName, value: Bytes) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|err| StoreError::Backend(err.to_string()))?;
        entries.insert(name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> PropName {
        PropName::new(s).unwrap()
    }

    #[test]
    fn set_then_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get(name("syNm")).unwrap(), None);

        store.set(name("syNm"), Bytes::from_static(b"Attic")).unwrap();
        assert_eq!(store.get(name("syNm")).unwrap(), Some(Bytes::from_static(b"Attic")));
    }

    #[test]
    fn seeded_entries_are_visible() {
        let store = MemoryStore::seeded([(name("dbug"), Bytes::from_static(&[0, 0, 0x30, 0]))]);
        assert!(store.get(name("dbug")).unwrap().is_some());
    }

    #[test]
    fn overwrite_replaces_value() {
        let store = MemoryStore::new();
        store.set(name("syLo"), Bytes::from_static(b"attic")).unwrap();
        store.set(name("syLo"), Bytes::from_static(b"garage")).unwrap();
        assert_eq!(store.get(name("syLo")).unwrap(), Some(Bytes::from_static(b"garage")));
    }
}
