//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageResult;
use crate::store::BlobStore;

/// Process-local blob store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with blobs.
    pub fn with_blobs<I, K>(blobs: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<u8>)>,
        K: Into<String>,
    {
        let blobs = blobs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            blobs: Arc::new(RwLock::new(blobs)),
        }
    }

    /// Delete a blob. Returns whether it existed.
    pub async fn remove(&self, name: &str) -> bool {
        self.blobs.write().await.remove(name).is_some()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.blobs.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn get(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(name).cloned())
    }

    async fn put(&self, name: &str, data: Vec<u8>) -> StorageResult<u64> {
        let written = data.len() as u64;
        self.blobs.write().await.insert(name.to_string(), data);
        Ok(written)
    }

    async fn update(&self, name: &str, data: Vec<u8>) -> StorageResult<Option<u64>> {
        let mut blobs = self.blobs.write().await;
        match blobs.get_mut(name) {
            Some(existing) => {
                let written = data.len() as u64;
                *existing = data;
                Ok(Some(written))
            }
            None => Ok(None),
        }
    }
}
