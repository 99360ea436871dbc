//! Storage seam and backend selection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::S3Client;
use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryStore;

/// Key/value store for image blobs. Names are opaque strings.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch a blob, `None` if it does not exist.
    async fn get(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Write a blob, replacing any previous content. Returns the number of bytes written.
    async fn put(&self, name: &str, data: Vec<u8>) -> StorageResult<u64>;

    /// Overwrite a blob only if it still exists. `None` means nothing was written.
    async fn update(&self, name: &str, data: Vec<u8>) -> StorageResult<Option<u64>>;

    /// Check that the backing service is reachable.
    async fn check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Which blob store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Memory,
}

impl StorageBackend {
    /// Read `STORAGE_BACKEND` (`s3` or `memory`, default `s3`).
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("STORAGE_BACKEND") {
            Err(_) => Ok(StorageBackend::S3),
            Ok(v) => match v.trim().to_lowercase().as_str() {
                "s3" => Ok(StorageBackend::S3),
                "memory" => Ok(StorageBackend::Memory),
                other => Err(StorageError::config_error(format!(
                    "STORAGE_BACKEND must be 's3' or 'memory', got '{}'",
                    other
                ))),
            },
        }
    }
}

/// Build the configured blob store.
pub async fn store_from_env() -> StorageResult<Arc<dyn BlobStore>> {
    match StorageBackend::from_env()? {
        StorageBackend::S3 => {
            let client = S3Client::from_env().await?;
            info!("Using S3 blob store (bucket {})", client.bucket());
            Ok(Arc::new(client))
        }
        StorageBackend::Memory => {
            info!("Using in-memory blob store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
