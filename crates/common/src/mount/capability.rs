use serde::{Deserialize, Serialize};

use crate::crypto::Secret;
use crate::linked_data::{BlockEncoded, ContentHash, PublicKeyHash};

/// Where a node lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reference {
    /// The current root of a published subtree, found through the
    ///  pointer table and that subtree's manifest
    Pointer {
        owner: PublicKeyHash,
        writer: PublicKeyHash,
    },
    /// A fixed version of a node
    Immutable(ContentHash),
}

/// A key plus a location. Holding one is all it takes to read what it
///  points at, and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub base_key: Secret,
    pub reference: Reference,
}

impl Capability {
    pub fn pointer(owner: PublicKeyHash, writer: PublicKeyHash, base_key: Secret) -> Self {
        Self {
            base_key,
            reference: Reference::Pointer { owner, writer },
        }
    }
}

/// A mount in a user's view: the capability is reachable at `path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub path: Vec<String>,
    pub capability: Capability,
}

/// The mounts a user has collected, stored encrypted alongside their
///  home tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoints(pub Vec<EntryPoint>);

impl BlockEncoded for EntryPoints {}

impl EntryPoints {
    /// Add a mount, replacing any previous one at the same path
    pub fn upsert(&mut self, entry: EntryPoint) {
        self.0.retain(|existing| existing.path != entry.path);
        self.0.push(entry);
    }
}
