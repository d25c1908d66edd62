use crate::crypto::{Secret, SecretKey, SecretShare};
use crate::error::FsError;
use crate::linked_data::{BlockEncoded, ContentHash, PublicKeyHash};
use crate::pointer::{HashCasPair, SignedCasRecord};
use crate::retry::with_retries;

use super::capability::{Capability, EntryPoint, EntryPoints};
use super::edit::TreeEdit;
use super::io::Mount;
use super::manifest::Manifest;

/// A subtree published under its own pointer, and the keys needed to
///  publish the next version of it
#[derive(Debug, Clone)]
pub struct Scope {
    pub owner: SecretKey,
    pub writer: SecretKey,
}

impl Scope {
    /// The owner's home tree, published under `(owner, owner)`
    pub fn home(owner: &SecretKey) -> Self {
        Self {
            owner: owner.clone(),
            writer: owner.clone(),
        }
    }

    pub fn owner_hash(&self) -> PublicKeyHash {
        self.owner.public().hash()
    }

    pub fn writer_hash(&self) -> PublicKeyHash {
        self.writer.public().hash()
    }

    pub fn capability(&self, key: Secret) -> Capability {
        Capability::pointer(self.owner_hash(), self.writer_hash(), key)
    }
}

/// What a commit does to a scope
#[derive(Debug, Clone)]
pub enum Change {
    Tree(TreeEdit),
    /// Record a mount in the owner's home manifest
    AddEntryPoint(EntryPoint),
    /// Re-encrypt the root under a new key and reseal it to the owner
    Rotate(Secret),
}

/// One published version of a scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub manifest: ContentHash,
    pub root: ContentHash,
    pub height: u64,
}

impl Mount<'_> {
    /// Publish the first version of a scope, rooted at an already
    ///  stored node
    pub async fn publish_genesis(
        &self,
        scope: &Scope,
        root_hash: ContentHash,
        key: &Secret,
    ) -> Result<ContentHash, FsError> {
        with_retries(self.config, "publish_genesis", |_| async move {
            let share = SecretShare::new(key, &scope.owner.public(), self.entropy)?;
            let manifest_hash = self
                .store_manifest(&Manifest::genesis(root_hash, share))
                .await?;
            let record =
                SignedCasRecord::sign(&scope.writer, &HashCasPair::new(None, Some(manifest_hash)));
            self.set_pointer(&scope.owner_hash(), &scope.writer_hash(), &record)
                .await?;
            Ok(manifest_hash)
        })
        .await
    }

    /// Apply a change to the current version of a scope and publish
    ///  the result
    ///
    /// Every attempt refetches the current manifest and replays the
    ///  change against it. Conflicting and transient failures are
    ///  retried up to the configured attempt count.
    pub async fn commit(&self, scope: &Scope, change: &Change) -> Result<ContentHash, FsError> {
        with_retries(self.config, "commit", |attempt| async move {
            let result = self.commit_once(scope, change).await;
            if let Err(err) = &result {
                if err.is_conflict() {
                    tracing::debug!(
                        "commit: writer {} lost a race on attempt {}",
                        scope.writer_hash(),
                        attempt
                    );
                }
            }
            result
        })
        .await
    }

    async fn commit_once(&self, scope: &Scope, change: &Change) -> Result<ContentHash, FsError> {
        let owner = scope.owner_hash();
        let writer = scope.writer_hash();
        let (current, manifest) = self.current_manifest(&owner, &writer).await?;
        let key = manifest.owner_share().recover(&scope.owner)?;

        let next = match change {
            Change::Tree(edit) => {
                let root = self.load_node(manifest.root(), &key).await?;
                let root = edit.apply(self, root, &key).await?;
                let root_hash = self.store_node(&root, &key).await?;
                manifest.next(current, root_hash)
            }
            Change::AddEntryPoint(entry) => {
                let mut entry_points = self.load_entry_points(&manifest, &key).await?;
                entry_points.upsert(entry.clone());
                let data = key.encrypt(&entry_points.encode()?, self.entropy)?;
                let entry_points_hash = self.put(data).await?;
                manifest
                    .next(current, *manifest.root())
                    .with_entry_points(Some(entry_points_hash))
            }
            Change::Rotate(new_key) => {
                let root = self.load_node(manifest.root(), &key).await?;
                let root_hash = self.store_node(&root.rekey(&key, new_key)?, new_key).await?;
                let entry_points = match manifest.entry_points() {
                    Some(_) => {
                        let entry_points = self.load_entry_points(&manifest, &key).await?;
                        let data = new_key.encrypt(&entry_points.encode()?, self.entropy)?;
                        Some(self.put(data).await?)
                    }
                    None => None,
                };
                let share = SecretShare::new(new_key, &scope.owner.public(), self.entropy)?;
                manifest
                    .next(current, root_hash)
                    .with_owner_share(share)
                    .with_entry_points(entry_points)
            }
        };

        let next_hash = self.store_manifest(&next).await?;
        let record = SignedCasRecord::sign(
            &scope.writer,
            &HashCasPair::new(Some(current), Some(next_hash)),
        );
        match self.set_pointer(&owner, &writer, &record).await {
            Ok(()) => {}
            Err(err) if err.is_retryable() && !err.is_conflict() => {
                // a timed out update may still have been accepted
                if self.get_pointer(&owner, &writer).await? != Some(next_hash) {
                    return Err(err);
                }
                tracing::debug!("commit: update landed despite {}", err);
            }
            Err(err) => return Err(err),
        }
        tracing::debug!(
            "commit: writer {} now at height {} ({})",
            writer,
            next.height(),
            next_hash
        );
        Ok(next_hash)
    }

    /// The mounts recorded in a home manifest
    pub async fn load_entry_points(
        &self,
        manifest: &Manifest,
        key: &Secret,
    ) -> Result<EntryPoints, FsError> {
        let Some(hash) = manifest.entry_points() else {
            return Ok(EntryPoints::default());
        };
        let blob = self.get(hash).await?;
        let data = key
            .decrypt(&blob)
            .map_err(|_| FsError::Unauthorized(format!("cannot decrypt entry points {}", hash)))?;
        Ok(EntryPoints::decode(&data)?)
    }

    /// Walk a scope's manifest chain, newest first
    pub async fn history(
        &self,
        owner: &PublicKeyHash,
        writer: &PublicKeyHash,
    ) -> Result<Vec<Version>, FsError> {
        let mut versions = Vec::new();
        let mut next = self.get_pointer(owner, writer).await?;
        while let Some(hash) = next {
            let manifest = self.load_manifest(&hash).await?;
            versions.push(Version {
                manifest: hash,
                root: *manifest.root(),
                height: manifest.height(),
            });
            next = manifest.previous().copied();
        }
        Ok(versions)
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::config::Config;
    use crate::crypto::Entropy;
    use crate::mount::node::{DirNode, Node};
    use crate::network::Network;

    #[tokio::test]
    async fn test_genesis_commit_and_history() {
        let network = Network::memory().await.unwrap();
        let config = Config::default();
        let entropy = Entropy::seeded(70);
        let mount = Mount::new(&network, &config, &entropy);

        let owner = SecretKey::generate(&entropy);
        mount.register_key(&owner).await.unwrap();
        let scope = Scope::home(&owner);
        let key = mount.fresh_key();

        let root_hash = mount
            .store_node(&Node::Dir(DirNode::default()), &key)
            .await
            .unwrap();
        mount.publish_genesis(&scope, root_hash, &key).await.unwrap();
        let head = mount
            .commit(
                &scope,
                &Change::Tree(TreeEdit::Create {
                    path: vec!["a.txt".into()],
                    data: Bytes::from_static(b"abc"),
                }),
            )
            .await
            .unwrap();

        let history = mount
            .history(&scope.owner_hash(), &scope.writer_hash())
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].manifest, head);
        assert_eq!(history[0].height, 1);
        assert_eq!(history[1].height, 0);

        let (node, _) = mount
            .resolve(&scope.capability(key.clone()), Some(&owner))
            .await
            .unwrap();
        assert!(node.as_dir().unwrap().get("a.txt").is_some());
    }

    #[tokio::test]
    async fn test_rotate_locks_out_old_key() {
        let network = Network::memory().await.unwrap();
        let config = Config::default();
        let entropy = Entropy::seeded(71);
        let mount = Mount::new(&network, &config, &entropy);

        let owner = SecretKey::generate(&entropy);
        let writer = SecretKey::generate(&entropy);
        mount.register_key(&writer).await.unwrap();
        let scope = Scope {
            owner: owner.clone(),
            writer,
        };
        let old_key = mount.fresh_key();
        let root_hash = mount
            .store_node(&Node::Dir(DirNode::default()), &old_key)
            .await
            .unwrap();
        mount
            .publish_genesis(&scope, root_hash, &old_key)
            .await
            .unwrap();

        let new_key = mount.fresh_key();
        mount
            .commit(&scope, &Change::Rotate(new_key.clone()))
            .await
            .unwrap();

        let stale = scope.capability(old_key);
        assert!(matches!(
            mount.resolve(&stale, None).await,
            Err(FsError::Unauthorized(_))
        ));
        assert!(mount.resolve(&scope.capability(new_key), None).await.is_ok());
        // the owner reads through the resealed share whatever key they hold
        assert!(mount.resolve(&stale, Some(&owner)).await.is_ok());
    }
}
