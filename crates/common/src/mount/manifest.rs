//! # Manifest
//!
//! The block a pointer names. One manifest per published version of a
//!  subtree:
//!
//! - **Content**: hash of the encrypted root node
//! - **History**: hash of the previous manifest and the height in the
//!   chain, so every accepted update extends a single append-only log
//! - **Owner access**: the root key sealed to the owner, which keeps the
//!   owner able to read the subtree whatever key its parent entry holds
//! - **Mounts**: for a user's home tree, the encrypted list of entry
//!   points they have collected
//!
//! Manifests are plaintext DAG-CBOR. Everything they reference is
//!  encrypted.

use serde::{Deserialize, Serialize};

use crate::crypto::SecretShare;
use crate::linked_data::{BlockEncoded, ContentHash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    root: ContentHash,
    previous: Option<ContentHash>,
    height: u64,
    owner_share: SecretShare,
    entry_points: Option<ContentHash>,
}

impl BlockEncoded for Manifest {}

impl Manifest {
    /// First version of a subtree
    pub fn genesis(root: ContentHash, owner_share: SecretShare) -> Self {
        Self {
            root,
            previous: None,
            height: 0,
            owner_share,
            entry_points: None,
        }
    }

    /// The version following this one, stored at `this`
    pub fn next(&self, this: ContentHash, root: ContentHash) -> Self {
        Self {
            root,
            previous: Some(this),
            height: self.height + 1,
            owner_share: self.owner_share,
            entry_points: self.entry_points,
        }
    }

    pub fn with_owner_share(mut self, owner_share: SecretShare) -> Self {
        self.owner_share = owner_share;
        self
    }

    pub fn with_entry_points(mut self, entry_points: Option<ContentHash>) -> Self {
        self.entry_points = entry_points;
        self
    }

    pub fn root(&self) -> &ContentHash {
        &self.root
    }

    pub fn previous(&self) -> Option<&ContentHash> {
        self.previous.as_ref()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn owner_share(&self) -> &SecretShare {
        &self.owner_share
    }

    pub fn entry_points(&self) -> Option<&ContentHash> {
        self.entry_points.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{Entropy, Secret, SecretKey};

    #[test]
    fn test_chain() {
        let entropy = Entropy::seeded(40);
        let owner = SecretKey::generate(&entropy);
        let key = Secret::generate(&entropy);
        let share = SecretShare::new(&key, &owner.public(), &entropy).unwrap();

        let genesis = Manifest::genesis(ContentHash::of(b"root-0"), share);
        let genesis_hash = ContentHash::of(&genesis.encode().unwrap());
        let next = genesis.next(genesis_hash, ContentHash::of(b"root-1"));

        assert_eq!(next.height(), 1);
        assert_eq!(next.previous(), Some(&genesis_hash));
        assert_eq!(next.owner_share().recover(&owner).unwrap(), key);

        let decoded = Manifest::decode(&next.encode().unwrap()).unwrap();
        assert_eq!(decoded, next);
    }
}
