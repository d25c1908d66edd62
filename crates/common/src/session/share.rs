use crate::client::SHARED_DIR;
use crate::crypto::{Secret, SecretKey};
use crate::error::FsError;
use crate::linked_data::ContentHash;
use crate::mount::path::split_last;
use crate::mount::{
    Capability, Change, Metadata, Mount, Node, NodeKind, OpenEntry, Reference, Scope,
    TreeEdit,
};

use super::Session;

/// A follower's `shared/<name>` directory
struct FollowerDir {
    name: String,
    scope: Scope,
    entry: OpenEntry,
}

impl Session {
    /// Give each recipient a capability to `path`
    ///
    /// An item that is not yet its own published subtree is promoted
    ///  first: it gets a writer key and a pointer of its own, and its
    ///  parent entry becomes a pointer entry. The content is neither
    ///  moved nor re-encrypted. The capability is then linked into the
    ///  `shared/<recipient>` directory of every recipient, which must
    ///  already exist.
    pub async fn share(&self, path: &str, recipients: &[&str]) -> Result<(), FsError> {
        tracing::info!("share: {} with {:?}", path, recipients);
        let rel = self.home_relative(path)?;
        let (_, name) = split_last(&rel)?;
        let located = self.locate(&rel, false).await?;
        let leaf = located
            .leaf
            .ok_or_else(|| FsError::PathNotFound(path.to_string()))?;

        let item = match leaf.target {
            Reference::Immutable(root) => {
                self.promote(&located.scope, &located.rel, root, leaf)
                    .await?
            }
            Reference::Pointer { .. } if self.writer_of(&leaf).is_some() => leaf,
            Reference::Pointer { .. } => return Err(FsError::Unauthorized(path.to_string())),
        };

        let mount = self.mount();
        for recipient in recipients {
            let follower = self
                .follower_dir(recipient)
                .await?
                .ok_or_else(|| FsError::NotFollower(recipient.to_string()))?;

            let (node, key) = mount
                .resolve(&follower.entry.capability(), Some(&self.secret_key))
                .await?;
            if let Some(existing) = node.as_dir().and_then(|dir| dir.get(name)) {
                if existing.open(&key)?.target != item.target {
                    return Err(FsError::PathAlreadyExists(format!(
                        "/{}/{}/{}/{}",
                        self.username, SHARED_DIR, recipient, name
                    )));
                }
            }

            let child = OpenEntry {
                target: item.target,
                key: item.key.clone(),
                writer: None,
                metadata: item.metadata,
            };
            mount
                .commit(
                    &follower.scope,
                    &Change::Tree(TreeEdit::Link {
                        path: vec![name.to_string()],
                        child,
                        replace: true,
                    }),
                )
                .await?;
            tracing::debug!("share: linked {} into {}'s shared directory", path, recipient);
        }
        Ok(())
    }

    /// Publish an inline item under a fresh writer key, and point its
    ///  parent entry at the new pointer
    async fn promote(
        &self,
        parent: &Scope,
        rel: &[String],
        root: ContentHash,
        leaf: OpenEntry,
    ) -> Result<OpenEntry, FsError> {
        let mount = self.mount();
        let writer = SecretKey::generate(mount.entropy);
        let writer_hash = mount.register_key(&writer).await?;
        let scope = Scope {
            owner: self.secret_key.clone(),
            writer: writer.clone(),
        };
        mount.publish_genesis(&scope, root, &leaf.key).await?;

        let promoted = OpenEntry {
            target: Reference::Pointer {
                owner: self.key_hash,
                writer: writer_hash,
            },
            key: leaf.key,
            writer: Some(OpenEntry::seal_writer(
                &writer,
                &self.secret_key.public(),
                mount.entropy,
            )?),
            metadata: leaf.metadata,
        };
        mount
            .commit(
                parent,
                &Change::Tree(TreeEdit::Link {
                    path: rel.to_vec(),
                    child: promoted.clone(),
                    replace: true,
                }),
            )
            .await?;
        tracing::debug!("promote: published subtree under writer {}", writer_hash);
        Ok(promoted)
    }

    /// Revoke `recipient`'s access to a shared item
    ///
    /// The item's root key is rotated, then the parent entry and every
    ///  other recipient's entry are rekeyed. The revoked entry is left
    ///  in place holding the old key, which no longer decrypts
    ///  anything published from here on. Each step is its own commit; if
    ///  one fails the owner still reads the item through the key sealed
    ///  in its manifest, and calling `unshare` again redoes the rotation.
    pub async fn unshare(&self, path: &str, recipient: &str) -> Result<(), FsError> {
        tracing::info!("unshare: {} from {}", path, recipient);
        let rel = self.home_relative(path)?;
        let located = self.locate(&rel, false).await?;
        let item = located
            .leaf
            .ok_or_else(|| FsError::PathNotFound(path.to_string()))?;
        let Some(writer) = self.writer_of(&item) else {
            return Err(FsError::NotShared(path.to_string()));
        };

        let mount = self.mount();
        let new_key = mount.fresh_key();
        let item_scope = Scope {
            owner: self.secret_key.clone(),
            writer,
        };
        mount
            .commit(&item_scope, &Change::Rotate(new_key.clone()))
            .await?;
        mount
            .commit(
                &located.scope,
                &Change::Tree(TreeEdit::Rekey {
                    path: located.rel.clone(),
                    key: new_key.clone(),
                }),
            )
            .await?;

        for follower in self.follower_dirs().await? {
            if follower.name == recipient {
                continue;
            }
            let (node, key) = mount
                .resolve(&follower.entry.capability(), Some(&self.secret_key))
                .await?;
            let Node::Dir(dir) = node else {
                continue;
            };
            for (name, sealed) in &dir.entries {
                if sealed.open(&key)?.target != item.target {
                    continue;
                }
                mount
                    .commit(
                        &follower.scope,
                        &Change::Tree(TreeEdit::Rekey {
                            path: vec![name.clone()],
                            key: new_key.clone(),
                        }),
                    )
                    .await?;
                tracing::debug!("unshare: rekeyed {}'s entry {}", follower.name, name);
            }
        }
        Ok(())
    }

    /// The `shared/<name>` directory kept for a follower, if any
    async fn follower_dir(&self, name: &str) -> Result<Option<FollowerDir>, FsError> {
        let located = self
            .locate(&[SHARED_DIR.to_string(), name.to_string()], true)
            .await?;
        let Some(entry) = located.leaf else {
            return Ok(None);
        };
        if self.writer_of(&entry).is_none() {
            return Ok(None);
        }
        Ok(Some(FollowerDir {
            name: name.to_string(),
            scope: located.scope,
            entry,
        }))
    }

    async fn follower_dirs(&self) -> Result<Vec<FollowerDir>, FsError> {
        let mount = self.mount();
        let located = self.locate(&[SHARED_DIR.to_string()], true).await?;
        let Some(shared) = located.leaf else {
            return Ok(Vec::new());
        };
        let (node, key) = mount
            .resolve(&shared.capability(), Some(&self.secret_key))
            .await?;
        let Node::Dir(dir) = node else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for (name, sealed) in &dir.entries {
            let entry = sealed.open(&key)?;
            let Some(writer) = self.writer_of(&entry) else {
                continue;
            };
            out.push(FollowerDir {
                name: name.clone(),
                scope: Scope {
                    owner: self.secret_key.clone(),
                    writer,
                },
                entry,
            });
        }
        Ok(out)
    }

    /// Make sure a `shared/<name>` directory exists for a follower,
    ///  returning a capability to it
    pub(crate) async fn ensure_follower_dir(
        &self,
        name: &str,
        key: Option<Secret>,
    ) -> Result<Capability, FsError> {
        if let Some(existing) = self.follower_dir(name).await? {
            return Ok(existing.entry.capability());
        }

        let mount = self.mount();
        let writer = SecretKey::generate(mount.entropy);
        let writer_hash = mount.register_key(&writer).await?;
        let scope = Scope {
            owner: self.secret_key.clone(),
            writer: writer.clone(),
        };
        let key = key.unwrap_or_else(|| mount.fresh_key());
        let root = mount
            .store_node(&Node::Dir(Default::default()), &key)
            .await?;
        mount.publish_genesis(&scope, root, &key).await?;

        let entry = OpenEntry {
            target: Reference::Pointer {
                owner: self.key_hash,
                writer: writer_hash,
            },
            key,
            writer: Some(OpenEntry::seal_writer(
                &writer,
                &self.secret_key.public(),
                mount.entropy,
            )?),
            metadata: Metadata::new(NodeKind::Dir, 0, Mount::now()),
        };
        mount
            .commit(
                &Scope::home(&self.secret_key),
                &Change::Tree(TreeEdit::Link {
                    path: vec![SHARED_DIR.to_string(), name.to_string()],
                    child: entry.clone(),
                    replace: false,
                }),
            )
            .await?;
        tracing::debug!("ensure_follower_dir: created {}/{}", SHARED_DIR, name);
        Ok(entry.capability())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testkit::TestNetwork;

    async fn befriend(net: &TestNetwork, a: &Session, b: &Session) {
        let key = Secret::generate(net.client().entropy());
        a.send_follow_request(b.username(), key).await.unwrap();
        let requests = b.get_follow_requests().await.unwrap();
        b.send_reply_follow_request(&requests[0], true, true)
            .await
            .unwrap();
        a.get_follow_requests().await.unwrap();
    }

    #[tokio::test]
    async fn test_folder_reader_cannot_recover_nested_writer() {
        let net = TestNetwork::new().await.unwrap();
        let a = net.user("a").await.unwrap();
        let b = net.user("b").await.unwrap();
        let c = net.user("c").await.unwrap();
        befriend(&net, &a, &b).await;
        befriend(&net, &a, &c).await;

        a.create_file("/a/folder/f.txt", "nested").await.unwrap();
        a.share("/a/folder", &["b"]).await.unwrap();
        a.share("/a/folder/f.txt", &["c"]).await.unwrap();

        let folder = b
            .get_by_path("/a/shared/b/folder")
            .await
            .unwrap()
            .and_then(|info| info.capability)
            .unwrap();
        let (node, key) = b.mount().resolve(&folder, None).await.unwrap();
        let entry = node
            .as_dir()
            .and_then(|dir| dir.get("f.txt"))
            .unwrap()
            .open(&key)
            .unwrap();

        assert!(entry.writer.is_some());
        assert!(entry.writer_key(&b.secret_key).is_err());
        assert!(b.writer_of(&entry).is_none());
        assert!(entry.writer_key(&a.secret_key).unwrap().is_some());
        assert!(a.writer_of(&entry).is_some());

        assert_eq!(b.read("/a/shared/b/folder/f.txt").await.unwrap(), b"nested");
        assert_eq!(c.read("/a/shared/c/f.txt").await.unwrap(), b"nested");
    }
}
