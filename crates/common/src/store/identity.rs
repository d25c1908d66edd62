use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::crypto::PublicKey;
use crate::linked_data::PublicKeyHash;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("username already claimed: {0}")]
    UsernameTaken(String),
    #[error("identity registry unreachable: {0}")]
    Unreachable(String),
    #[error("registry error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Directory of public signing keys, addressed by their hash
///
/// Also records which key claimed a username, so users can be found
///  by name when sending follow requests.
#[async_trait]
pub trait IdentityRegistry: Send + Sync + std::fmt::Debug + 'static {
    /// Register a signing key. Idempotent.
    async fn put_signing_key(&self, key: PublicKey) -> Result<PublicKeyHash, RegistryError>;

    async fn get_signing_key(
        &self,
        hash: &PublicKeyHash,
    ) -> Result<Option<PublicKey>, RegistryError>;

    /// Bind `username` to `owner`. Claiming a name twice for the same
    ///  owner succeeds; claiming someone else's fails.
    async fn claim_username(
        &self,
        username: &str,
        owner: PublicKeyHash,
    ) -> Result<(), RegistryError>;

    async fn lookup_username(&self, username: &str)
        -> Result<Option<PublicKeyHash>, RegistryError>;
}

/// In-memory identity registry
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityRegistry {
    inner: Arc<RwLock<MemoryIdentityRegistryInner>>,
}

#[derive(Debug, Default)]
struct MemoryIdentityRegistryInner {
    keys: HashMap<PublicKeyHash, PublicKey>,
    usernames: HashMap<String, PublicKeyHash>,
}

impl MemoryIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RegistryError {
    RegistryError::Default(anyhow::anyhow!("registry lock poisoned: {}", e))
}

#[async_trait]
impl IdentityRegistry for MemoryIdentityRegistry {
    async fn put_signing_key(&self, key: PublicKey) -> Result<PublicKeyHash, RegistryError> {
        let hash = key.hash();
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.keys.insert(hash, key);
        Ok(hash)
    }

    async fn get_signing_key(
        &self,
        hash: &PublicKeyHash,
    ) -> Result<Option<PublicKey>, RegistryError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.keys.get(hash).copied())
    }

    async fn claim_username(
        &self,
        username: &str,
        owner: PublicKeyHash,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        match inner.usernames.get(username) {
            Some(existing) if *existing != owner => {
                Err(RegistryError::UsernameTaken(username.to_string()))
            }
            Some(_) => Ok(()),
            None => {
                inner.usernames.insert(username.to_string(), owner);
                Ok(())
            }
        }
    }

    async fn lookup_username(
        &self,
        username: &str,
    ) -> Result<Option<PublicKeyHash>, RegistryError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.usernames.get(username).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Entropy, SecretKey};

    #[tokio::test]
    async fn test_put_and_get_signing_key() {
        let registry = MemoryIdentityRegistry::new();
        let key = SecretKey::generate(&Entropy::seeded(1)).public();

        let hash = registry.put_signing_key(key).await.unwrap();
        assert_eq!(hash, key.hash());
        assert_eq!(registry.get_signing_key(&hash).await.unwrap(), Some(key));

        // registering again hands back the same hash
        assert_eq!(registry.put_signing_key(key).await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_unknown_key_is_none() {
        let registry = MemoryIdentityRegistry::new();
        let key = SecretKey::generate(&Entropy::seeded(2)).public();
        assert_eq!(registry.get_signing_key(&key.hash()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_claim_username() {
        let registry = MemoryIdentityRegistry::new();
        let entropy = Entropy::seeded(3);
        let alice = SecretKey::generate(&entropy).public().hash();
        let mallory = SecretKey::generate(&entropy).public().hash();

        registry.claim_username("alice", alice).await.unwrap();
        registry.claim_username("alice", alice).await.unwrap();
        assert!(matches!(
            registry.claim_username("alice", mallory).await,
            Err(RegistryError::UsernameTaken(_))
        ));
        assert_eq!(registry.lookup_username("alice").await.unwrap(), Some(alice));
        assert_eq!(registry.lookup_username("bob").await.unwrap(), None);
    }
}
