//! File-system storage.

use std::path::Path;

use async_trait::async_trait;
use console_relay_core::traits::{Storage, StorageError};
use tokio::{fs, io::AsyncWriteExt};

/// Storage backed by `tokio::fs`.
///
/// Destinations are file paths. Parent directories are created on first
/// write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    native_append: bool,
}

impl FileStorage {
    /// File storage using the native append primitive.
    #[must_use]
    pub const fn new() -> Self {
        Self { native_append: true }
    }

    /// File storage that only exposes exists/read/write.
    #[must_use]
    pub const fn read_modify_write() -> Self {
        Self {
            native_append: false,
        }
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new()
    }
}

async fn ensure_parent(path: &str) -> Result<(), StorageError> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(path).await?)
    }

    async fn read(&self, path: &str) -> Result<String, StorageError> {
        fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StorageError> {
        ensure_parent(path).await?;
        fs::write(path, content).await?;
        Ok(())
    }

    fn supports_append(&self) -> bool {
        self.native_append
    }

    async fn append(&self, path: &str, content: &str) -> Result<(), StorageError> {
        if !self.native_append {
            return Err(StorageError::Unsupported);
        }
        ensure_parent(path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
