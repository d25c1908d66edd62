use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::linked_data::PublicKeyHash;

#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("inbox unreachable: {0}")]
    Unreachable(String),
    #[error("inbox error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Per-recipient message queue
///
/// Messages are opaque sealed envelopes. Draining is destructive, so a
///  message is handed out at most once.
#[async_trait]
pub trait InboxProvider: Send + Sync + std::fmt::Debug + 'static {
    async fn post(&self, recipient: PublicKeyHash, message: Bytes) -> Result<(), InboxError>;

    /// Remove and return everything queued for `recipient`, oldest first
    async fn take_all(&self, recipient: &PublicKeyHash) -> Result<Vec<Bytes>, InboxError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryInboxProvider {
    inner: Arc<RwLock<HashMap<PublicKeyHash, Vec<Bytes>>>>,
}

impl MemoryInboxProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InboxProvider for MemoryInboxProvider {
    async fn post(&self, recipient: PublicKeyHash, message: Bytes) -> Result<(), InboxError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        inner.entry(recipient).or_default().push(message);
        Ok(())
    }

    async fn take_all(&self, recipient: &PublicKeyHash) -> Result<Vec<Bytes>, InboxError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?;
        Ok(inner.remove(recipient).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Entropy, SecretKey};

    #[tokio::test]
    async fn test_take_all_is_at_most_once() {
        let inbox = MemoryInboxProvider::new();
        let bob = SecretKey::generate(&Entropy::seeded(5)).public().hash();

        inbox.post(bob, Bytes::from_static(b"one")).await.unwrap();
        inbox.post(bob, Bytes::from_static(b"two")).await.unwrap();

        let drained = inbox.take_all(&bob).await.unwrap();
        assert_eq!(drained, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
        assert!(inbox.take_all(&bob).await.unwrap().is_empty());
    }
}
