use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::linked_data::{ContentHash, PublicKeyHash};
use crate::pointer::{HashCasPair, PointerError, PointerProvider, SignedCasRecord};
use crate::store::{BlockStore, StoreError};

/// How an injected failure shows up
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Fail straight away as unreachable
    Unreachable,
    /// Hang for this long before answering
    Stall(Duration),
}

/// Take one failure off the budget, if any are left
fn take(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

/// Block store whose next calls fail
#[derive(Debug)]
pub struct FlakyBlockStore {
    inner: Arc<dyn BlockStore>,
    fault: Fault,
    failures: AtomicU32,
}

impl FlakyBlockStore {
    pub fn new(inner: Arc<dyn BlockStore>, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            failures: AtomicU32::new(0),
        }
    }

    /// Make the next `count` calls fail
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    async fn inject(&self) -> Result<(), StoreError> {
        if !take(&self.failures) {
            return Ok(());
        }
        match self.fault {
            Fault::Unreachable => Err(StoreError::Unreachable("injected fault".to_string())),
            Fault::Stall(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BlockStore for FlakyBlockStore {
    async fn put(&self, data: Vec<u8>) -> Result<ContentHash, StoreError> {
        self.inject().await?;
        self.inner.put(data).await
    }

    async fn get(&self, hash: &ContentHash) -> Result<Bytes, StoreError> {
        self.inject().await?;
        self.inner.get(hash).await
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        self.inject().await?;
        self.inner.has(hash).await
    }
}

/// Pointer provider that rejects the next updates as conflicts without
///  applying them, as if another writer kept winning the race
#[derive(Debug)]
pub struct FlakyPointerProvider {
    inner: Arc<dyn PointerProvider>,
    passes: AtomicU32,
    conflicts: AtomicU32,
}

impl FlakyPointerProvider {
    pub fn new(inner: Arc<dyn PointerProvider>) -> Self {
        Self {
            inner,
            passes: AtomicU32::new(0),
            conflicts: AtomicU32::new(0),
        }
    }

    /// Reject the next `count` updates. `u32::MAX` is effectively forever.
    pub fn conflict_next(&self, count: u32) {
        self.conflict_after(0, count);
    }

    /// Let `skip` updates through, then reject the `count` after them
    pub fn conflict_after(&self, skip: u32, count: u32) {
        self.passes.store(skip, Ordering::SeqCst);
        self.conflicts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl PointerProvider for FlakyPointerProvider {
    async fn set_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        record: &SignedCasRecord,
    ) -> Result<(), PointerError> {
        if !take(&self.passes) && take(&self.conflicts) {
            let pair = HashCasPair::deserialize(record.payload())?;
            return Err(PointerError::CasConflict {
                expected: pair.previous,
                actual: self.inner.get_pointer(owner, writer).await?,
            });
        }
        self.inner.set_pointer(owner, writer, record).await
    }

    async fn get_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<ContentHash>, PointerError> {
        self.inner.get_pointer(owner, writer).await
    }

    async fn get_record(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<SignedCasRecord>, PointerError> {
        self.inner.get_record(owner, writer).await
    }
}
