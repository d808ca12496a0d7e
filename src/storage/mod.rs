//! Blob storage collaborator.
//!
//! Source images are read from one container and resized images are written
//! to another. The [`BlobStore`] trait is the seam; [`LocalBlobStore`] keeps
//! containers as directories on disk and [`MemoryBlobStore`] keeps them in
//! process memory.
//!
//! ## Connection strings
//!
//! The backend is chosen by a `Key=Value;` connection string, read from the
//! environment at startup:
//!
//! ```text
//! Backend=local;Root=/var/lib/resize-worker/blobs
//! Backend=memory
//! ```
//!
//! `Backend=memory` lives and dies with the process, so nothing outside it
//! can upload sources. It is for tests and embedding; the worker
//! configuration rejects it.
//!
//! ## Process-wide client
//!
//! [`StorageClient::global`] builds the client once per process and hands the
//! same read-only handle to every job. Containers are created on first use
//! and remembered, so the existence check runs once per container per
//! process.

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tracing::{debug, info};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {container}/{blob}")]
    NotFound { container: String, blob: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid connection string: {0}")]
    Connection(String),
}

/// What was written by [`BlobStore::store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub container: String,
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the container unless it exists. Returns `true` if it was created.
    async fn create_container_if_not_exists(&self, container: &str) -> StorageResult<bool>;

    async fn fetch(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>>;

    /// Write `data` in full, replacing any existing blob of the same name.
    ///
    /// Readers never observe a partially written blob.
    async fn store(
        &self,
        container: &str,
        blob: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata>;

    async fn exists(&self, container: &str, blob: &str) -> StorageResult<bool>;
}

/// Parsed storage connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConnection {
    Local { root: PathBuf },
    Memory,
}

impl StorageConnection {
    /// Parse `Key=Value;Key=Value`. Keys are case-insensitive.
    pub fn parse(connection_string: &str) -> StorageResult<Self> {
        let mut backend = None;
        let mut root = None;

        for pair in connection_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StorageError::Connection(format!("expected Key=Value, got {pair:?}"))
            })?;
            match key.trim().to_ascii_lowercase().as_str() {
                "backend" => backend = Some(value.trim().to_ascii_lowercase()),
                "root" => root = Some(PathBuf::from(value.trim())),
                other => {
                    return Err(StorageError::Connection(format!("unknown key {other:?}")));
                }
            }
        }

        match backend.as_deref() {
            Some("local") => match root {
                Some(root) if !root.as_os_str().is_empty() => Ok(Self::Local { root }),
                _ => Err(StorageError::Connection(
                    "Backend=local requires Root".into(),
                )),
            },
            Some("memory") => Ok(Self::Memory),
            Some(other) => Err(StorageError::Connection(format!(
                "unknown backend {other:?}"
            ))),
            None => Err(StorageError::Connection("missing Backend".into())),
        }
    }

    /// Whether other processes see the same blobs.
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    pub fn connect(&self) -> Arc<dyn BlobStore> {
        match self {
            Self::Local { root } => Arc::new(LocalBlobStore::new(root.clone())),
            Self::Memory => Arc::new(MemoryBlobStore::new()),
        }
    }
}

/// Shared handle over a [`BlobStore`] that creates containers on first use.
pub struct StorageClient {
    backend: Arc<dyn BlobStore>,
    ready: Mutex<HashSet<String>>,
}

static GLOBAL: OnceLock<Arc<StorageClient>> = OnceLock::new();

impl StorageClient {
    pub fn new(backend: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            ready: Mutex::new(HashSet::new()),
        }
    }

    /// The process-wide client, built from `connection_string` on first call.
    ///
    /// Later calls return the existing client; the argument is only parsed
    /// the first time.
    pub fn global(connection_string: &str) -> StorageResult<Arc<StorageClient>> {
        if let Some(client) = GLOBAL.get() {
            return Ok(Arc::clone(client));
        }
        let connection = StorageConnection::parse(connection_string)?;
        info!(?connection, "Initializing storage client");
        let client = GLOBAL.get_or_init(|| Arc::new(StorageClient::new(connection.connect())));
        Ok(Arc::clone(client))
    }

    async fn ensure_container(&self, container: &str) -> StorageResult<()> {
        if self.is_ready(container) {
            return Ok(());
        }
        if self.backend.create_container_if_not_exists(container).await? {
            info!(container, "Created container");
        }
        if let Ok(mut ready) = self.ready.lock() {
            ready.insert(container.to_string());
        }
        Ok(())
    }

    fn is_ready(&self, container: &str) -> bool {
        self.ready
            .lock()
            .map(|ready| ready.contains(container))
            .unwrap_or(false)
    }

    pub async fn fetch(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>> {
        self.ensure_container(container).await?;
        let data = self.backend.fetch(container, blob).await?;
        debug!(container, blob, size = data.len(), "Fetched blob");
        Ok(data)
    }

    pub async fn store(
        &self,
        container: &str,
        blob: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> StorageResult<BlobMetadata> {
        self.ensure_container(container).await?;
        let metadata = self.backend.store(container, blob, data, content_type).await?;
        debug!(container, blob, size = metadata.size, "Stored blob");
        Ok(metadata)
    }
}

/// Container names: lower-case ASCII letters, digits and dashes.
pub(crate) fn validate_container_name(container: &str) -> StorageResult<()> {
    let valid = !container.is_empty()
        && container
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(format!("container {container:?}")))
    }
}

/// Blob names: non-empty `/`-separated segments, none of them `.` or `..`.
pub(crate) fn validate_blob_name(blob: &str) -> StorageResult<()> {
    let valid = !blob.is_empty()
        && !blob.contains('\\')
        && !blob.contains('\0')
        && blob
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(format!("blob {blob:?}")))
    }
}
