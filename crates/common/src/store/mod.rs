//! Contracts of the external services the core consumes, with the
//!  implementations used in-process.

use async_trait::async_trait;
use bytes::Bytes;

use crate::linked_data::ContentHash;

mod blobs_store;
mod identity;
mod inbox;

pub use blobs_store::{BlobsStore, StoreError};
pub use identity::{IdentityRegistry, MemoryIdentityRegistry, RegistryError};
pub use inbox::{InboxError, InboxProvider, MemoryInboxProvider};

/// Immutable content-addressed storage
#[async_trait]
pub trait BlockStore: Send + Sync + std::fmt::Debug + 'static {
    /// Store `data`, returning its digest
    async fn put(&self, data: Vec<u8>) -> Result<ContentHash, StoreError>;

    /// Fetch a blob. Fails with [`StoreError::NotFound`] if absent.
    async fn get(&self, hash: &ContentHash) -> Result<Bytes, StoreError>;

    async fn has(&self, hash: &ContentHash) -> Result<bool, StoreError>;
}
