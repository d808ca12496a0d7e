use super::{
    BlobMetadata, BlobStore, StorageError, StorageResult, validate_blob_name,
    validate_container_name,
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Default)]
struct Inner {
    containers: HashMap<String, HashMap<String, StoredBlob>>,
    created: Vec<String>,
    writes: usize,
}

/// In-process blob store. Contents live as long as the value.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: RwLock<Inner>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob, creating its container if needed.
    pub async fn insert(&self, container: &str, blob: &str, data: impl Into<Vec<u8>>) {
        let mut inner = self.inner.write().await;
        inner
            .containers
            .entry(container.to_string())
            .or_default()
            .insert(
                blob.to_string(),
                StoredBlob {
                    data: data.into(),
                    content_type: None,
                },
            );
    }

    pub async fn get(&self, container: &str, blob: &str) -> Option<StoredBlob> {
        let inner = self.inner.read().await;
        inner.containers.get(container)?.get(blob).cloned()
    }

    /// Names of blobs in a container, sorted.
    pub async fn list(&self, container: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner
            .containers
            .get(container)
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Containers created through [`BlobStore::create_container_if_not_exists`], in order.
    pub async fn containers_created(&self) -> Vec<String> {
        self.inner.read().await.created.clone()
    }

    /// Number of successful [`BlobStore::store`] calls.
    pub async fn write_count(&self) -> usize {
        self.inner.read().await.writes
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool> {
        validate_container_name(container)?;
        let mut inner = self.inner.write().await;
        if inner.containers.contains_key(container) {
            return Ok(false);
        }
        inner.containers.insert(container.to_string(), HashMap::new());
        inner.created.push(container.to_string());
        Ok(true)
    }

    async fn fetch(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>> {
        validate_blob_name(blob)?;
        let inner = self.inner.read().await;
        let blobs = inner
            .containers
            .get(container)
            .ok_or_else(|| StorageError::ContainerNotFound(container.to_string()))?;
        blobs
            .get(blob)
            .map(|stored| stored.data.clone())
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            })
    }

    async fn store(
        &self,
        container: &str,
        blob: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        validate_blob_name(blob)?;
        let mut inner = self.inner.write().await;
        let blobs = inner
            .containers
            .get_mut(container)
            .ok_or_else(|| StorageError::ContainerNotFound(container.to_string()))?;
        blobs.insert(
            blob.to_string(),
            StoredBlob {
                data: data.to_vec(),
                content_type: content_type.map(str::to_string),
            },
        );
        inner.writes += 1;

        Ok(BlobMetadata {
            container: container.to_string(),
            name: blob.to_string(),
            size: data.len() as u64,
            content_type: content_type.map(str::to_string),
        })
    }

    async fn exists(&self, container: &str, blob: &str) -> StorageResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .containers
            .get(container)
            .is_some_and(|blobs| blobs.contains_key(blob)))
    }
}
