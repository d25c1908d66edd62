use std::sync::Arc;

use crate::pointer::{MemoryPointerProvider, PointerProvider};
use crate::store::{
    BlobsStore, BlockStore, IdentityRegistry, InboxProvider, MemoryIdentityRegistry,
    MemoryInboxProvider, StoreError,
};

/// Handles to every external service a client talks to
#[derive(Debug, Clone)]
pub struct Network {
    pub blocks: Arc<dyn BlockStore>,
    pub identities: Arc<dyn IdentityRegistry>,
    pub pointers: Arc<dyn PointerProvider>,
    pub inbox: Arc<dyn InboxProvider>,
}

impl Network {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        identities: Arc<dyn IdentityRegistry>,
        pointers: Arc<dyn PointerProvider>,
        inbox: Arc<dyn InboxProvider>,
    ) -> Self {
        Self {
            blocks,
            identities,
            pointers,
            inbox,
        }
    }

    /// Everything in process: a memory blob store plus memory registry,
    ///  pointer table and inbox
    pub async fn memory() -> Result<Self, StoreError> {
        let blocks = BlobsStore::memory().await?;
        Ok(Self::with_blocks(Arc::new(blocks)))
    }

    /// In-process registry, pointers and inbox over the given block store
    pub fn with_blocks(blocks: Arc<dyn BlockStore>) -> Self {
        let identities: Arc<dyn IdentityRegistry> = Arc::new(MemoryIdentityRegistry::new());
        let pointers = Arc::new(MemoryPointerProvider::new(identities.clone()));
        Self::new(blocks, identities, pointers, Arc::new(MemoryInboxProvider::new()))
    }
}
