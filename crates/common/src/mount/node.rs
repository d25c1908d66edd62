use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{
    Entropy, PublicKey, Secret, SecretError, SecretKey, SecretShare, SecretShareError,
    WrappedKey, SECRET_SIZE,
};
use crate::linked_data::{BlockEncoded, ContentHash};

use super::capability::{Capability, Reference};

/**
 * Nodes
 * =====
 * A tree is made of two kinds of node:
 *  - Dir nodes map names to entries. An entry says where the child
 *    lives and carries the child's key, wrapped under the key of the
 *    directory holding it.
 *  - File nodes list the chunks of a file's content. Every chunk is
 *    encrypted under its own key, wrapped under the file's key.
 * The signing key of a published subtree is never wrapped under a
 *  directory key: it is sealed to the owner, so holding a directory's
 *  read key never lets anyone publish below it.
 * Nodes are DAG-CBOR encoded, then encrypted under their own key and
 *  stored by the hash of the ciphertext. A node is never rewritten in
 *  place: an edit stores new nodes from the changed leaf up to the
 *  root.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Dir,
}

/// Entry metadata. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: NodeKind,
    /// Byte length for files, number of entries for directories
    pub size: u64,
    pub created: i64,
    pub modified: i64,
}

impl Metadata {
    pub fn new(kind: NodeKind, size: u64, now: i64) -> Self {
        Self {
            kind,
            size,
            created: now,
            modified: now,
        }
    }

    pub fn touched(&self, size: u64, now: i64) -> Self {
        Self {
            size,
            modified: now,
            ..*self
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }
}

/// One encrypted slice of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub hash: ContentHash,
    pub key: WrappedKey,
    /// Plaintext length
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub size: u64,
    /// Every chunk but the last holds exactly this many bytes
    pub chunk_size: u64,
    pub chunks: Vec<ChunkRef>,
}

impl FileNode {
    pub fn empty(chunk_size: usize) -> Self {
        Self {
            size: 0,
            chunk_size: chunk_size.max(1) as u64,
            chunks: Vec::new(),
        }
    }
}

/// A sealed directory entry, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub target: Reference,
    /// Child key wrapped under the directory key
    pub key: WrappedKey,
    /// Signing key of a published subtree, sealed to the subtree's
    ///  owner
    pub writer: Option<SecretShare>,
    pub metadata: Metadata,
}

impl DirEntry {
    pub fn open(&self, parent_key: &Secret) -> Result<OpenEntry, SecretError> {
        Ok(OpenEntry {
            target: self.target,
            key: parent_key.unwrap(&self.key)?,
            writer: self.writer,
            metadata: self.metadata,
        })
    }
}

/// A directory entry with its child key unwrapped. The writer key
///  stays sealed until the owner asks for it.
#[derive(Debug, Clone)]
pub struct OpenEntry {
    pub target: Reference,
    pub key: Secret,
    pub writer: Option<SecretShare>,
    pub metadata: Metadata,
}

impl OpenEntry {
    pub fn seal(&self, parent_key: &Secret) -> Result<DirEntry, SecretError> {
        Ok(DirEntry {
            target: self.target,
            key: parent_key.wrap(&self.key)?,
            writer: self.writer,
            metadata: self.metadata,
        })
    }

    /// Seal a subtree signing key so only `owner` can recover it
    pub fn seal_writer(
        writer: &SecretKey,
        owner: &PublicKey,
        entropy: &Entropy,
    ) -> Result<SecretShare, SecretShareError> {
        SecretShare::new(&Secret::from(writer.to_bytes()), owner, entropy)
    }

    /// Recover the subtree signing key with the owner's key
    ///
    /// `Ok(None)` for entries that carry no writer key. Anyone but the
    ///  owner gets an error.
    pub fn writer_key(&self, owner: &SecretKey) -> Result<Option<SecretKey>, SecretShareError> {
        let Some(share) = &self.writer else {
            return Ok(None);
        };
        let secret = share.recover(owner)?;
        let mut bytes = [0u8; SECRET_SIZE];
        bytes.copy_from_slice(secret.bytes());
        Ok(Some(SecretKey::from(bytes)))
    }

    pub fn capability(&self) -> Capability {
        Capability {
            base_key: self.key.clone(),
            reference: self.target,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirNode {
    pub entries: BTreeMap<String, DirEntry>,
}

impl DirNode {
    pub fn get(&self, name: &str) -> Option<&DirEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: String, entry: DirEntry) -> Option<DirEntry> {
        self.entries.insert(name, entry)
    }

    pub fn remove(&mut self, name: &str) -> Option<DirEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Dir(DirNode),
    File(FileNode),
}

impl BlockEncoded for Node {}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Dir(_) => NodeKind::Dir,
            Node::File(_) => NodeKind::File,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Node::Dir(dir) => dir.len() as u64,
            Node::File(file) => file.size,
        }
    }

    pub fn as_dir(&self) -> Option<&DirNode> {
        match self {
            Node::Dir(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    /// Re-wrap the key material this node holds from `old` to `new`
    ///
    /// Children are untouched: their keys stay the same, only the
    ///  wrapping changes, so nothing below this node is re-encrypted.
    pub fn rekey(&self, old: &Secret, new: &Secret) -> Result<Node, SecretError> {
        match self {
            Node::Dir(dir) => {
                let mut entries = BTreeMap::new();
                for (name, entry) in &dir.entries {
                    entries.insert(name.clone(), entry.open(old)?.seal(new)?);
                }
                Ok(Node::Dir(DirNode { entries }))
            }
            Node::File(file) => {
                let mut chunks = Vec::with_capacity(file.chunks.len());
                for chunk in &file.chunks {
                    chunks.push(ChunkRef {
                        key: new.wrap(&old.unwrap(&chunk.key)?)?,
                        ..chunk.clone()
                    });
                }
                Ok(Node::File(FileNode {
                    chunks,
                    ..file.clone()
                }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Entropy;

    fn entry(entropy: &Entropy, owner: Option<&SecretKey>) -> OpenEntry {
        let writer = owner.map(|owner| {
            let writer = SecretKey::generate(entropy);
            OpenEntry::seal_writer(&writer, &owner.public(), entropy).unwrap()
        });
        OpenEntry {
            target: Reference::Immutable(ContentHash::of(b"child")),
            key: Secret::generate(entropy),
            writer,
            metadata: Metadata::new(NodeKind::File, 3, 1_000),
        }
    }

    #[test]
    fn test_seal_open_entry() {
        let entropy = Entropy::seeded(30);
        let parent = Secret::generate(&entropy);
        let owner = SecretKey::generate(&entropy);
        let open = entry(&entropy, Some(&owner));

        let sealed = open.seal(&parent).unwrap();
        let reopened = sealed.open(&parent).unwrap();
        assert_eq!(reopened.key, open.key);
        assert_eq!(reopened.writer, open.writer);
        assert_eq!(reopened.metadata, open.metadata);

        let stranger = Secret::generate(&entropy);
        assert!(sealed.open(&stranger).is_err());
    }

    #[test]
    fn test_node_encoding_roundtrip() {
        let entropy = Entropy::seeded(31);
        let parent = Secret::generate(&entropy);
        let mut dir = DirNode::default();
        dir.insert("a.txt".into(), entry(&entropy, None).seal(&parent).unwrap());
        let node = Node::Dir(dir);

        assert_eq!(Node::decode(&node.encode().unwrap()).unwrap(), node);
    }

    #[test]
    fn test_rekey_dir_keeps_child_keys() {
        let entropy = Entropy::seeded(32);
        let old = Secret::generate(&entropy);
        let new = Secret::generate(&entropy);
        let owner = SecretKey::generate(&entropy);
        let child = entry(&entropy, Some(&owner));

        let mut dir = DirNode::default();
        dir.insert("x".into(), child.seal(&old).unwrap());
        let rekeyed = Node::Dir(dir).rekey(&old, &new).unwrap();

        let sealed = rekeyed.as_dir().unwrap().get("x").unwrap();
        assert!(sealed.open(&old).is_err());
        let reopened = sealed.open(&new).unwrap();
        assert_eq!(reopened.key, child.key);
        assert_eq!(reopened.writer, child.writer);
    }

    #[test]
    fn test_writer_key_only_opens_for_owner() {
        let entropy = Entropy::seeded(34);
        let parent = Secret::generate(&entropy);
        let owner = SecretKey::generate(&entropy);
        let reader = SecretKey::generate(&entropy);
        let writer = SecretKey::generate(&entropy);
        let open = OpenEntry {
            writer: Some(OpenEntry::seal_writer(&writer, &owner.public(), &entropy).unwrap()),
            ..entry(&entropy, None)
        };

        // a reader holding the directory key sees the entry but not the writer key
        let reopened = open.seal(&parent).unwrap().open(&parent).unwrap();
        assert!(reopened.writer_key(&reader).is_err());
        let recovered = reopened.writer_key(&owner).unwrap().unwrap();
        assert_eq!(recovered.to_bytes(), writer.to_bytes());
        assert!(entry(&entropy, None).writer_key(&owner).unwrap().is_none());
    }

    #[test]
    fn test_rekey_file_rewraps_chunks() {
        let entropy = Entropy::seeded(33);
        let old = Secret::generate(&entropy);
        let new = Secret::generate(&entropy);
        let chunk_key = Secret::generate(&entropy);
        let file = Node::File(FileNode {
            size: 4,
            chunk_size: 4,
            chunks: vec![ChunkRef {
                hash: ContentHash::of(b"data"),
                key: old.wrap(&chunk_key).unwrap(),
                len: 4,
            }],
        });

        let Node::File(rekeyed) = file.rekey(&old, &new).unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(new.unwrap(&rekeyed.chunks[0].key).unwrap(), chunk_key);
        assert_eq!(rekeyed.size, 4);
    }
}
