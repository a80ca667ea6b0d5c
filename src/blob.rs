//! Blob store boundary: an opaque key→bytes store with a two-phase write
//! (request a target, then push bytes) and reference-based reads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Opaque reference to stored bytes. The core never inspects media content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub String);

impl std::fmt::Display for BlobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write target handed out by `begin_upload`; bytes are pushed against it in
/// a second step.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub blob: BlobRef,
    pub location: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Phase one: allocate a blob reference and a write location.
    async fn begin_upload(&self) -> Result<UploadTarget>;

    /// Phase two: push the bytes for a previously allocated target.
    async fn put(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<()>;

    /// Read a blob back by reference.
    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>>;

    /// A fetchable URL for playback by external consumers.
    async fn fetch_url(&self, blob: &BlobRef) -> Result<String>;
}

/// Filesystem-backed store: one file per blob under a configured directory.
pub struct FsBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.into(),
        })
    }

    fn path_for(&self, blob: &BlobRef) -> PathBuf {
        self.root.join(&blob.0)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn begin_upload(&self) -> Result<UploadTarget> {
        let blob = BlobRef(Uuid::new_v4().to_string());
        let location = self.path_for(&blob).to_string_lossy().into_owned();
        Ok(UploadTarget { blob, location })
    }

    async fn put(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<()> {
        tokio::fs::write(&target.location, bytes).await?;
        info!("stored blob {} at {}", target.blob, target.location);
        Ok(())
    }

    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        tokio::fs::read(self.path_for(blob))
            .await
            .map_err(|_| Error::not_found("blob", &blob.0))
    }

    async fn fetch_url(&self, blob: &BlobRef) -> Result<String> {
        if !self.path_for(blob).exists() {
            return Err(Error::not_found("blob", &blob.0));
        }
        Ok(format!("{}/{}", self.public_base_url.trim_end_matches('/'), blob.0))
    }
}

/// In-memory store for tests and embedded drivers.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn begin_upload(&self) -> Result<UploadTarget> {
        let blob = BlobRef(Uuid::new_v4().to_string());
        let location = blob.0.clone();
        Ok(UploadTarget { blob, location })
    }

    async fn put(&self, target: &UploadTarget, bytes: Vec<u8>) -> Result<()> {
        self.inner.write().await.insert(target.location.clone(), bytes);
        Ok(())
    }

    async fn fetch(&self, blob: &BlobRef) -> Result<Vec<u8>> {
        self.inner
            .read()
            .await
            .get(&blob.0)
            .cloned()
            .ok_or_else(|| Error::not_found("blob", &blob.0))
    }

    async fn fetch_url(&self, blob: &BlobRef) -> Result<String> {
        if !self.inner.read().await.contains_key(&blob.0) {
            return Err(Error::not_found("blob", &blob.0));
        }
        Ok(format!("memory://{}", blob.0))
    }
}
