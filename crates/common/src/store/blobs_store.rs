use std::future::IntoFuture;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use iroh_blobs::{
    api::{
        blobs::{BlobStatus, Blobs},
        ExportBaoError, RequestError,
    },
    store::{fs::FsStore, mem::MemStore},
    BlobsProtocol, Hash,
};

use super::BlockStore;
use crate::linked_data::ContentHash;

/// Block store over a local iroh-blobs store
///
/// iroh-blobs addresses blobs by their BLAKE3 digest, which is exactly
///  a [`ContentHash`], so hashes convert byte for byte.
#[derive(Clone, Debug)]
pub struct BlobsStore {
    pub inner: Arc<BlobsProtocol>,
}

impl Deref for BlobsStore {
    type Target = Arc<BlobsProtocol>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("blob not found: {0}")]
    NotFound(ContentHash),
    #[error("block store unreachable: {0}")]
    Unreachable(String),
    #[error("blobs store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export bao error: {0}")]
    ExportBao(#[from] ExportBaoError),
    #[error("request error: {0}")]
    Request(#[from] RequestError),
}

impl BlobsStore {
    /// Load a blob store persisted at `path`
    pub async fn fs(path: &Path) -> Result<Self, StoreError> {
        tracing::debug!("BlobsStore::fs: loading store at {:?}", path);
        let store = FsStore::load(path).await?;
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Load a memory blobs store
    pub async fn memory() -> Result<Self, StoreError> {
        let store = MemStore::new();
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    pub fn blobs(&self) -> &Blobs {
        self.inner.store().blobs()
    }
}

fn to_iroh(hash: &ContentHash) -> Hash {
    Hash::from_bytes(*hash.as_bytes())
}

#[async_trait]
impl BlockStore for BlobsStore {
    async fn put(&self, data: Vec<u8>) -> Result<ContentHash, StoreError> {
        let hash = self.blobs().add_bytes(data).into_future().await?.hash;
        Ok(ContentHash::from_bytes(*hash.as_bytes()))
    }

    async fn get(&self, hash: &ContentHash) -> Result<Bytes, StoreError> {
        if !self.has(hash).await? {
            return Err(StoreError::NotFound(*hash));
        }
        let bytes = self.blobs().get_bytes(to_iroh(hash)).await?;
        Ok(bytes)
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        let stat = self
            .blobs()
            .status(to_iroh(hash))
            .await
            .map_err(|err| StoreError::Default(anyhow!(err)))?;
        Ok(matches!(stat, BlobStatus::Complete { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = BlobsStore::memory().await.unwrap();
        let data = b"Hello, World!".to_vec();

        let hash = store.put(data.clone()).await.unwrap();
        assert_eq!(hash, ContentHash::of(&data));

        let retrieved = store.get(&hash).await.unwrap();
        assert_eq!(retrieved.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = BlobsStore::memory().await.unwrap();
        let missing = ContentHash::of(b"never stored");

        assert!(!store.has(&missing).await.unwrap());
        assert!(matches!(
            store.get(&missing).await,
            Err(StoreError::NotFound(hash)) if hash == missing
        ));
    }

    #[tokio::test]
    async fn test_fs_store_persists_blobs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blobs");

        let store = BlobsStore::fs(&path).await.unwrap();
        let hash = store.put(b"persistent".to_vec()).await.unwrap();
        assert!(store.has(&hash).await.unwrap());
        assert_eq!(store.get(&hash).await.unwrap().as_ref(), b"persistent");
    }
}
