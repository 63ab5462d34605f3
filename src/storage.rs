//! Credential storage seam
//!
//! The session manager persists the current token through this
//! key-value surface. Storage is a cache, not a source of truth: a
//! value read back from it is never trusted without signature
//! verification.

use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// External storage read/write failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StorageError(pub String);

/// Key-value persistence surface for credential material. The engine
/// is agnostic to the medium behind it.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store, the default for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StorageError("store lock poisoned".to_string()))?
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .map_err(|_| StorageError("store lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .map_err(|_| StorageError("store lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}
