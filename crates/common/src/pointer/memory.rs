use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::provider::{PointerError, PointerProvider};
use super::record::SignedCasRecord;
use crate::linked_data::{ContentHash, PublicKeyHash};
use crate::store::{IdentityRegistry, RegistryError};

/// In-memory pointer table
///
/// Signature checks happen before the table lock is taken; the
///  compare and the swap happen under a single write lock, which is
///  what makes updates to one key linearizable.
#[derive(Debug, Clone)]
pub struct MemoryPointerProvider {
    identities: Arc<dyn IdentityRegistry>,
    inner: Arc<RwLock<MemoryPointerProviderInner>>,
}

#[derive(Debug, Default)]
struct MemoryPointerProviderInner {
    /// (owner, writer) -> latest accepted value and the record that set it
    entries: HashMap<(PublicKeyHash, PublicKeyHash), PointerEntry>,
}

#[derive(Debug, Clone)]
struct PointerEntry {
    current: Option<ContentHash>,
    record: SignedCasRecord,
}

impl MemoryPointerProvider {
    pub fn new(identities: Arc<dyn IdentityRegistry>) -> Self {
        Self {
            identities,
            inner: Arc::new(RwLock::new(MemoryPointerProviderInner::default())),
        }
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> PointerError {
    PointerError::Provider(format!("failed to acquire lock: {}", e))
}

#[async_trait]
impl PointerProvider for MemoryPointerProvider {
    async fn set_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        record: &SignedCasRecord,
    ) -> Result<(), PointerError> {
        let writer_key = self
            .identities
            .get_signing_key(writer)
            .await
            .map_err(|e| match e {
                RegistryError::Unreachable(msg) => PointerError::Unreachable(msg),
                other => PointerError::Provider(other.to_string()),
            })?
            .ok_or(PointerError::NotFound(*writer))?;

        let pair = record.verify(&writer_key)?;

        let mut inner = self.inner.write().map_err(lock_error)?;
        let key = (*owner, *writer);
        let actual = inner.entries.get(&key).and_then(|entry| entry.current);
        if actual != pair.previous {
            tracing::debug!(
                "set_pointer: conflict on {}/{}: expected {:?}, found {:?}",
                owner,
                writer,
                pair.previous,
                actual
            );
            return Err(PointerError::CasConflict {
                expected: pair.previous,
                actual,
            });
        }

        inner.entries.insert(
            key,
            PointerEntry {
                current: pair.current,
                record: record.clone(),
            },
        );
        tracing::trace!(
            "set_pointer: {}/{} {:?} -> {:?}",
            owner,
            writer,
            pair.previous,
            pair.current
        );
        Ok(())
    }

    async fn get_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<ContentHash>, PointerError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner
            .entries
            .get(&(*owner, *writer))
            .and_then(|entry| entry.current))
    }

    async fn get_record(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<SignedCasRecord>, PointerError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner
            .entries
            .get(&(*owner, *writer))
            .map(|entry| entry.record.clone()))
    }
}
