use bytes::Bytes;
use futures::future::try_join_all;

use crate::config::Config;
use crate::crypto::{Entropy, PublicKey, Secret, SecretKey};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, ContentHash, PublicKeyHash};
use crate::network::Network;
use crate::pointer::SignedCasRecord;
use crate::retry::{timed, with_retries};

use super::capability::{Capability, Reference};
use super::manifest::Manifest;
use super::node::{ChunkRef, FileNode, Node};

/// Everything tree code needs to reach the network: the services,
///  the limits they are called under, and the random source keys are
///  drawn from
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mount<'a> {
    pub network: &'a Network,
    pub config: &'a Config,
    pub entropy: &'a Entropy,
}

impl<'a> Mount<'a> {
    pub fn new(network: &'a Network, config: &'a Config, entropy: &'a Entropy) -> Self {
        Self {
            network,
            config,
            entropy,
        }
    }

    pub fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    pub fn fresh_key(&self) -> Secret {
        Secret::generate(self.entropy)
    }

    // puts and reads are idempotent, so transient failures are retried
    //  in place
    pub async fn put(&self, data: Vec<u8>) -> Result<ContentHash, FsError> {
        let data = &data;
        with_retries(self.config, "put", |_| {
            timed(self.config, self.network.blocks.put(data.clone()))
        })
        .await
    }

    pub async fn get(&self, hash: &ContentHash) -> Result<Bytes, FsError> {
        with_retries(self.config, "get", |_| {
            timed(self.config, self.network.blocks.get(hash))
        })
        .await
    }

    pub async fn load_node(&self, hash: &ContentHash, key: &Secret) -> Result<Node, FsError> {
        tracing::trace!("load_node: fetching node {}", hash);
        let blob = self.get(hash).await?;
        // a key that does not authenticate the block is a missing capability
        let data = key
            .decrypt(&blob)
            .map_err(|_| FsError::Unauthorized(format!("cannot decrypt node {}", hash)))?;
        Ok(Node::decode(&data)?)
    }

    pub async fn store_node(&self, node: &Node, key: &Secret) -> Result<ContentHash, FsError> {
        let data = key.encrypt(&node.encode()?, self.entropy)?;
        self.put(data).await
    }

    pub async fn load_manifest(&self, hash: &ContentHash) -> Result<Manifest, FsError> {
        let data = self.get(hash).await?;
        Ok(Manifest::decode(&data)?)
    }

    pub async fn store_manifest(&self, manifest: &Manifest) -> Result<ContentHash, FsError> {
        self.put(manifest.encode()?).await
    }

    pub async fn get_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Option<ContentHash>, FsError> {
        with_retries(self.config, "get_pointer", |_| {
            timed(self.config, self.network.pointers.get_pointer(owner, writer))
        })
        .await
    }

    pub async fn set_pointer(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
        record: &SignedCasRecord,
    ) -> Result<(), FsError> {
        timed(
            self.config,
            self.network.pointers.set_pointer(owner, writer, record),
        )
        .await
    }

    /// Register a signing key so the pointer table accepts its records
    pub async fn register_key(&self, key: &SecretKey) -> Result<PublicKeyHash, FsError> {
        timed(
            self.config,
            self.network.identities.put_signing_key(key.public()),
        )
        .await
    }

    pub async fn signing_key(&self, hash: &PublicKeyHash) -> Result<Option<PublicKey>, FsError> {
        timed(self.config, self.network.identities.get_signing_key(hash)).await
    }

    /// Fetch the current manifest a pointer names, with its hash
    pub async fn current_manifest(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<(ContentHash, Manifest), FsError> {
        let hash = self
            .get_pointer(owner, writer)
            .await?
            .ok_or_else(|| FsError::PathNotFound(format!("no pointer for writer {}", writer)))?;
        let manifest = self.load_manifest(&hash).await?;
        Ok((hash, manifest))
    }

    /// Load the node a capability names, and the key it is encrypted
    ///  under
    ///
    /// For a pointer owned by `owner_key`, the key sealed in the
    ///  manifest wins over the capability's, so the owner can always
    ///  read their own subtrees.
    pub async fn resolve(
        &self,
        capability: &Capability,
        owner_key: Option<&SecretKey>,
    ) -> Result<(Node, Secret), FsError> {
        match &capability.reference {
            Reference::Immutable(hash) => {
                let node = self.load_node(hash, &capability.base_key).await?;
                Ok((node, capability.base_key.clone()))
            }
            Reference::Pointer { owner, writer } => {
                let (_, manifest) = self.current_manifest(owner, writer).await?;
                let key = owner_key
                    .filter(|key| key.public().hash() == *owner)
                    .and_then(|key| manifest.owner_share().recover(key).ok())
                    .unwrap_or_else(|| capability.base_key.clone());
                let node = self.load_node(manifest.root(), &key).await?;
                Ok((node, key))
            }
        }
    }

    /// Decrypt and join a file's chunks
    pub async fn read_file(&self, file: &FileNode, key: &Secret) -> Result<Vec<u8>, FsError> {
        let chunks = self.read_chunks(&file.chunks, key).await?;
        let mut out = Vec::with_capacity(file.size as usize);
        for chunk in chunks {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    async fn read_chunks(
        &self,
        chunks: &[ChunkRef],
        key: &Secret,
    ) -> Result<Vec<Vec<u8>>, FsError> {
        try_join_all(chunks.iter().map(|chunk| async move {
            let chunk_key = key
                .unwrap(&chunk.key)
                .map_err(|_| FsError::Unauthorized(format!("cannot unwrap chunk {}", chunk.hash)))?;
            let blob = self.get(&chunk.hash).await?;
            let data = chunk_key.decrypt(&blob).map_err(|_| {
                FsError::Unauthorized(format!("cannot decrypt chunk {}", chunk.hash))
            })?;
            if data.len() as u64 != chunk.len {
                return Err(FsError::Default(anyhow::anyhow!(
                    "chunk {} has length {}, expected {}",
                    chunk.hash,
                    data.len(),
                    chunk.len
                )));
            }
            Ok(data)
        }))
        .await
    }

    async fn store_chunks(
        &self,
        data: &[u8],
        chunk_size: usize,
        key: &Secret,
    ) -> Result<Vec<ChunkRef>, FsError> {
        let pieces = data
            .chunks(chunk_size)
            .map(|piece| {
                let chunk_key = self.fresh_key();
                let sealed = chunk_key.encrypt(piece, self.entropy)?;
                Ok::<_, FsError>((key.wrap(&chunk_key)?, sealed, piece.len() as u64))
            })
            .collect::<Result<Vec<_>, _>>()?;

        try_join_all(pieces.into_iter().map(|(wrapped, sealed, len)| async move {
            let hash = self.put(sealed).await?;
            Ok::<_, FsError>(ChunkRef {
                hash,
                key: wrapped,
                len,
            })
        }))
        .await
    }

    /// Write `data` into a file at `offset`, returning the new file node
    ///
    /// Only the chunks the write touches are re-read and re-stored.
    ///  With `truncate` the file ends where the write ends.
    pub async fn write_file(
        &self,
        file: &FileNode,
        key: &Secret,
        offset: u64,
        data: &[u8],
        truncate: bool,
    ) -> Result<FileNode, FsError> {
        if offset > file.size {
            return Err(FsError::OffsetPastEnd {
                offset,
                size: file.size,
            });
        }

        let chunk_size = file.chunk_size.max(1);
        let end = offset + data.len() as u64;
        let first = (offset / chunk_size) as usize;
        let last = if truncate {
            file.chunks.len()
        } else {
            (end.div_ceil(chunk_size) as usize).clamp(first, file.chunks.len())
        };

        let region_start = first as u64 * chunk_size;
        let old: Vec<u8> = self
            .read_chunks(&file.chunks[first..last], key)
            .await?
            .concat();

        let keep = (offset - region_start) as usize;
        let mut region = Vec::with_capacity(keep + data.len());
        region.extend_from_slice(&old[..keep.min(old.len())]);
        region.extend_from_slice(data);
        let written_to = (end - region_start) as usize;
        if !truncate && old.len() > written_to {
            region.extend_from_slice(&old[written_to..]);
        }

        let stored = self.store_chunks(&region, chunk_size as usize, key).await?;

        let mut chunks = file.chunks[..first].to_vec();
        chunks.extend(stored);
        if !truncate {
            chunks.extend_from_slice(&file.chunks[last..]);
        }
        let size = chunks.iter().map(|chunk| chunk.len).sum();
        tracing::trace!(
            "write_file: wrote {} bytes at {}, file now {} bytes in {} chunks",
            data.len(),
            offset,
            size,
            chunks.len()
        );

        Ok(FileNode {
            size,
            chunk_size,
            chunks,
        })
    }
}
