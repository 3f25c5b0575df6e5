//! In-memory storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use console_relay_core::traits::{Storage, StorageError};

/// In-memory storage implementation.
///
/// Has no native append, so every write through the serializer is a
/// read-modify-write. Useful for tests and for panels that only display.
/// Data is lost on restart.
pub struct MemoryStorage {
    files: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Content of a destination, if it exists.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<String> {
        self.files.read().ok()?.get(path).cloned()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self
            .files
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .contains_key(path))
    }

    async fn read(&self, path: &str) -> Result<String, StorageError> {
        self.files
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StorageError> {
        self.files
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(path.to_string(), content.to_string());
        Ok(())
    }
}
