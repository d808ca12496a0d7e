use super::{
    BlobMetadata, BlobStore, StorageError, StorageResult, validate_blob_name,
    validate_container_name,
};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Filesystem-backed blob store: `<root>/<container>/<blob>`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn container_path(&self, container: &str) -> StorageResult<PathBuf> {
        validate_container_name(container)?;
        Ok(self.root.join(container))
    }

    fn blob_path(&self, container: &str, blob: &str) -> StorageResult<PathBuf> {
        validate_blob_name(blob)?;
        Ok(self.container_path(container)?.join(blob))
    }

    async fn require_container(&self, container: &str) -> StorageResult<PathBuf> {
        let path = self.container_path(container)?;
        if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(path)
        } else {
            Err(StorageError::ContainerNotFound(container.to_string()))
        }
    }
}

/// Sibling path used while a blob is being written.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.partial"))
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool> {
        let path = self.container_path(container)?;
        if fs::metadata(&path).await.is_ok() {
            return Ok(false);
        }
        debug!("Creating container directory: {:?}", path);
        fs::create_dir_all(&path).await?;
        Ok(true)
    }

    async fn fetch(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>> {
        self.require_container(container).await?;
        let path = self.blob_path(container, blob)?;
        debug!("Reading blob from: {:?}", path);
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(
        &self,
        container: &str,
        blob: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        self.require_container(container).await?;
        let path = self.blob_path(container, blob)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write beside the target, then rename over it.
        let partial = partial_path(&path);
        if let Err(e) = fs::write(&partial, data).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        fs::rename(&partial, &path).await?;
        debug!("Stored blob: {:?} ({} bytes)", path, data.len());

        Ok(BlobMetadata {
            container: container.to_string(),
            name: blob.to_string(),
            size: data.len() as u64,
            content_type: content_type.map(str::to_string),
        })
    }

    async fn exists(&self, container: &str, blob: &str) -> StorageResult<bool> {
        let path = self.blob_path(container, blob)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false))
    }
}
