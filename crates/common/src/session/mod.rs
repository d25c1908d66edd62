//! A logged-in user's view of the network
//!
//! Paths are absolute and start with a username: `/alice/docs/a.txt`.
//!  What a session can see is the union of its entry points: its own
//!  home tree at `/<username>`, plus whatever capabilities it has been
//!  given, mounted where they were received. Directories above a mount
//!  that nobody published, such as `/alice/shared` in bob's view,
//!  exist only as listings of the mounts below them.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::client::Client;
use crate::crypto::{Secret, SecretKey};
use crate::error::FsError;
use crate::linked_data::PublicKeyHash;
use crate::mount::path::{components, is_prefix, join};
use crate::mount::{
    Capability, EntryPoint, Metadata, Mount, Node, NodeKind, OpenEntry, Reference, Scope, Version,
};

mod follow;
mod share;
mod write;

/// What a path resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub metadata: Metadata,
    /// `None` for directories that only exist as parents of mounts
    pub capability: Option<Capability>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }
}

/// A node reached by walking from an entry point
struct Resolved {
    node: Node,
    key: Secret,
    capability: Capability,
    metadata: Metadata,
}

/// Where a write lands: the scope publishing the path, the path
///  relative to that scope's root, and the entry already at the path
pub(crate) struct Located {
    pub scope: Scope,
    pub rel: Vec<String>,
    pub leaf: Option<OpenEntry>,
}

#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    username: String,
    secret_key: SecretKey,
    key_hash: PublicKeyHash,
    entry_points: Arc<RwLock<Vec<EntryPoint>>>,
}

impl Session {
    pub(crate) async fn open(
        client: Client,
        username: &str,
        secret_key: SecretKey,
    ) -> Result<Self, FsError> {
        let key_hash = secret_key.public().hash();
        let mount = client.mount();
        let (_, manifest) = mount.current_manifest(&key_hash, &key_hash).await?;
        let home_key = manifest.owner_share().recover(&secret_key)?;
        let stored = mount.load_entry_points(&manifest, &home_key).await?;

        let mut entry_points = vec![EntryPoint {
            path: vec![username.to_string()],
            capability: Capability::pointer(key_hash, key_hash, home_key),
        }];
        entry_points.extend(stored.0);
        tracing::debug!(
            "open: session for {} with {} entry points",
            username,
            entry_points.len()
        );

        Ok(Self {
            client,
            username: username.to_string(),
            secret_key,
            key_hash,
            entry_points: Arc::new(RwLock::new(entry_points)),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key_hash(&self) -> &PublicKeyHash {
        &self.key_hash
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn entry_points(&self) -> Vec<EntryPoint> {
        self.entry_points.read().clone()
    }

    fn mount(&self) -> Mount<'_> {
        self.client.mount()
    }

    fn home_capability(&self) -> Result<Capability, FsError> {
        self.entry_points
            .read()
            .first()
            .map(|entry| entry.capability.clone())
            .ok_or_else(|| FsError::UnknownUser(self.username.clone()))
    }

    /// The longest mount covering `path`
    fn entry_point_for(&self, path: &[String]) -> Option<EntryPoint> {
        self.entry_points
            .read()
            .iter()
            .filter(|entry| is_prefix(&entry.path, path))
            .max_by_key(|entry| entry.path.len())
            .cloned()
    }

    /// Names directly below `path` that lead to a mount
    fn mount_children(&self, path: &[String]) -> BTreeSet<String> {
        self.entry_points
            .read()
            .iter()
            .filter(|entry| entry.path.len() > path.len() && is_prefix(path, &entry.path))
            .map(|entry| entry.path[path.len()].clone())
            .collect()
    }

    async fn walk(&self, entry_point: &EntryPoint, rest: &[String]) -> Result<Resolved, FsError> {
        let mount = self.mount();
        let (mut node, mut key) = mount
            .resolve(&entry_point.capability, Some(&self.secret_key))
            .await?;
        let mut capability = entry_point.capability.clone();
        let mut metadata = Metadata::new(node.kind(), node.size(), 0);

        for (depth, name) in rest.iter().enumerate() {
            let consumed = || join(&[&entry_point.path[..], &rest[..=depth]].concat());
            let dir = node
                .as_dir()
                .ok_or_else(|| FsError::PathNotDir(consumed()))?;
            let entry = dir
                .get(name)
                .ok_or_else(|| FsError::PathNotFound(consumed()))?
                .open(&key)
                .map_err(|_| FsError::Unauthorized(consumed()))?;
            capability = entry.capability();
            (node, key) = mount.resolve(&capability, Some(&self.secret_key)).await?;
            metadata = entry.metadata.touched(node.size(), entry.metadata.modified);
        }

        Ok(Resolved {
            node,
            key,
            capability,
            metadata,
        })
    }

    /// Resolve a path, or `None` if this session cannot locate it
    async fn resolve_path(&self, path: &[String]) -> Result<Option<Resolved>, FsError> {
        let Some(entry_point) = self.entry_point_for(path) else {
            return Ok(None);
        };
        match self.walk(&entry_point, &path[entry_point.path.len()..]).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(err) if err.is_not_located() => {
                tracing::debug!("resolve_path: cannot locate {}: {}", join(path), err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Look up a path. Missing paths, paths through a file and paths
    ///  this session holds no working key for are all `None`.
    pub async fn get_by_path(&self, path: &str) -> Result<Option<FileInfo>, FsError> {
        let path = components(path)?;
        let name = path.last().cloned().unwrap_or_default();

        if let Some(resolved) = self.resolve_path(&path).await? {
            return Ok(Some(FileInfo {
                path: join(&path),
                name,
                metadata: resolved.metadata,
                capability: Some(resolved.capability),
            }));
        }

        let children = self.mount_children(&path);
        if path.is_empty() || (!children.is_empty() && self.entry_point_for(&path).is_none()) {
            return Ok(Some(FileInfo {
                path: join(&path),
                name,
                metadata: Metadata::new(NodeKind::Dir, children.len() as u64, 0),
                capability: None,
            }));
        }
        Ok(None)
    }

    /// List a directory
    pub async fn children(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let path = components(path)?;

        let Some(resolved) = self.resolve_path(&path).await? else {
            let mounts = self.mount_children(&path);
            if mounts.is_empty() && !path.is_empty() {
                return Err(FsError::PathNotFound(join(&path)));
            }
            return Ok(mounts
                .into_iter()
                .map(|name| {
                    let child = [&path[..], &[name.clone()]].concat();
                    FileInfo {
                        path: join(&child),
                        name,
                        metadata: Metadata::new(NodeKind::Dir, 0, 0),
                        capability: None,
                    }
                })
                .collect());
        };

        let Node::Dir(dir) = resolved.node else {
            return Err(FsError::PathNotDir(join(&path)));
        };
        let mut out = Vec::with_capacity(dir.len());
        for (name, sealed) in &dir.entries {
            let child = [&path[..], &[name.clone()]].concat();
            match sealed.open(&resolved.key) {
                Ok(entry) => out.push(FileInfo {
                    path: join(&child),
                    name: name.clone(),
                    metadata: entry.metadata,
                    capability: Some(entry.capability()),
                }),
                Err(err) => tracing::warn!("children: skipping {}: {}", join(&child), err),
            }
        }
        Ok(out)
    }

    /// Read a whole file
    pub async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let components = components(path)?;
        let resolved = self
            .resolve_path(&components)
            .await?
            .ok_or_else(|| FsError::PathNotFound(path.to_string()))?;
        match resolved.node {
            Node::File(file) => self.mount().read_file(&file, &resolved.key).await,
            Node::Dir(_) => Err(FsError::NotAFile(path.to_string())),
        }
    }

    /// Read a file straight from a capability
    pub async fn read_capability(&self, capability: &Capability) -> Result<Vec<u8>, FsError> {
        let mount = self.mount();
        match mount.resolve(capability, Some(&self.secret_key)).await? {
            (Node::File(file), key) => mount.read_file(&file, &key).await,
            (Node::Dir(_), _) => Err(FsError::NotAFile(format!("{:?}", capability.reference))),
        }
    }

    /// Published versions of the subtree holding `path`, newest first
    pub async fn history(&self, path: &str) -> Result<Vec<Version>, FsError> {
        let rel = self.home_relative(path)?;
        let located = self.locate(&rel, true).await?;
        self.mount()
            .history(&located.scope.owner_hash(), &located.scope.writer_hash())
            .await
    }

    /// Strip the username off a path this session may write to
    fn home_relative(&self, path: &str) -> Result<Vec<String>, FsError> {
        let mut components = components(path)?;
        if components.first() != Some(&self.username) {
            return Err(FsError::Unauthorized(format!(
                "{} is outside {}'s home",
                path, self.username
            )));
        }
        components.remove(0);
        Ok(components)
    }

    /// Signing key of a subtree we own, recovered from the entry's
    ///  owner-sealed share
    fn writer_of(&self, entry: &OpenEntry) -> Option<SecretKey> {
        match entry.target {
            Reference::Pointer { owner, .. } if owner == self.key_hash => {
                entry.writer_key(&self.secret_key).ok().flatten()
            }
            _ => None,
        }
    }

    /// Find the scope a home-relative path is published in
    ///
    /// Walks down the home tree, stepping into every published subtree
    ///  whose writer key we can recover from the parent entry. With `enter_leaf`
    ///  the final component is stepped into as well, so writes to a
    ///  shared file land in that file's own scope. Components that do
    ///  not exist yet are left in `rel` to be created by the edit.
    pub(crate) async fn locate(
        &self,
        path: &[String],
        enter_leaf: bool,
    ) -> Result<Located, FsError> {
        let mount = self.mount();
        let mut scope = Scope::home(&self.secret_key);
        let (mut node, mut key) = mount
            .resolve(&self.home_capability()?, Some(&self.secret_key))
            .await?;
        let mut rel: Vec<String> = Vec::new();
        let mut leaf = None;

        for (depth, name) in path.iter().enumerate() {
            let consumed = || join(&path[..=depth]);
            let last = depth + 1 == path.len();
            let Some(dir) = node.as_dir() else {
                return Err(FsError::PathNotDir(join(&path[..depth])));
            };
            let Some(sealed) = dir.get(name) else {
                rel.extend(path[depth..].iter().cloned());
                break;
            };
            let entry = sealed
                .open(&key)
                .map_err(|_| FsError::Unauthorized(consumed()))?;

            if last && !enter_leaf {
                rel.push(name.clone());
                leaf = Some(entry);
                break;
            }

            match entry.target {
                Reference::Pointer { .. } => {
                    let Some(writer) = self.writer_of(&entry) else {
                        return Err(FsError::Unauthorized(consumed()));
                    };
                    scope = Scope {
                        owner: self.secret_key.clone(),
                        writer,
                    };
                    rel.clear();
                    (node, key) = mount
                        .resolve(&entry.capability(), Some(&self.secret_key))
                        .await?;
                }
                Reference::Immutable(_) => {
                    rel.push(name.clone());
                    if !last {
                        (node, key) = mount.resolve(&entry.capability(), None).await?;
                    }
                }
            }
            if last {
                leaf = Some(entry);
            }
        }

        Ok(Located { scope, rel, leaf })
    }
}
