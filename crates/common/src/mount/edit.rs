use bytes::Bytes;

use crate::crypto::Secret;
use crate::error::FsError;

use super::capability::Reference;
use super::io::Mount;
use super::node::{DirNode, FileNode, Metadata, Node, NodeKind, OpenEntry};
use super::path::{is_prefix, join, split_last};

/// A change to one published subtree, with paths relative to its root
///
/// Edits are deltas, not snapshots: a commit that loses a race replays
///  the same edit against the newer root, so an append lands after
///  whatever was appended concurrently.
#[derive(Debug, Clone)]
pub enum TreeEdit {
    /// Create a directory, and any missing parents
    Mkdir { path: Vec<String> },
    /// Create a file that must not exist yet
    Create { path: Vec<String>, data: Bytes },
    /// Write into a file, creating it if it is missing and `offset` is 0
    Write {
        path: Vec<String>,
        offset: u64,
        data: Bytes,
        truncate: bool,
    },
    Append { path: Vec<String>, data: Bytes },
    /// Place an existing node under a name
    Link {
        path: Vec<String>,
        child: OpenEntry,
        replace: bool,
    },
    Unlink { path: Vec<String> },
    Rename { from: Vec<String>, to: Vec<String> },
    /// Swap the key an entry holds for its target
    Rekey { path: Vec<String>, key: Secret },
}

struct Frame {
    name: String,
    dir: DirNode,
    key: Secret,
    metadata: Metadata,
}

/// The directories along a path, root first, with the deepest on top
struct Cursor {
    ancestors: Vec<Frame>,
    top: Frame,
}

impl TreeEdit {
    /// Apply this edit to a subtree root, storing every new node and
    ///  returning the new root
    pub(crate) async fn apply(
        &self,
        mount: &Mount<'_>,
        root: Node,
        root_key: &Secret,
    ) -> Result<Node, FsError> {
        let now = Mount::now();

        // a published file is its own root
        let root_dir = match root {
            Node::Dir(dir) => dir,
            Node::File(file) => {
                return match self {
                    TreeEdit::Write {
                        path,
                        offset,
                        data,
                        truncate,
                    } if path.is_empty() => Ok(Node::File(
                        mount
                            .write_file(&file, root_key, *offset, data, *truncate)
                            .await?,
                    )),
                    TreeEdit::Append { path, data } if path.is_empty() => Ok(Node::File(
                        mount
                            .write_file(&file, root_key, file.size, data, false)
                            .await?,
                    )),
                    _ => Err(FsError::PathNotDir("/".to_string())),
                }
            }
        };

        let dir = match self {
            TreeEdit::Mkdir { path } => {
                let (parent, name) = split_last(path)?;
                let mut cursor = descend(mount, root_dir, root_key, parent, true, now).await?;
                if cursor.top.dir.get(name).is_some() {
                    return Err(FsError::PathAlreadyExists(join(path)));
                }
                let key = mount.fresh_key();
                let hash = mount.store_node(&Node::Dir(DirNode::default()), &key).await?;
                let entry = OpenEntry {
                    target: Reference::Immutable(hash),
                    key,
                    writer: None,
                    metadata: Metadata::new(NodeKind::Dir, 0, now),
                };
                cursor
                    .top
                    .dir
                    .insert(name.to_string(), entry.seal(&cursor.top.key)?);
                ascend(mount, cursor, now).await?
            }
            TreeEdit::Create { path, data } => {
                let (parent, name) = split_last(path)?;
                let mut cursor = descend(mount, root_dir, root_key, parent, true, now).await?;
                if cursor.top.dir.get(name).is_some() {
                    return Err(FsError::PathAlreadyExists(join(path)));
                }
                let key = mount.fresh_key();
                let empty = FileNode::empty(mount.config.chunk_size);
                let file = mount.write_file(&empty, &key, 0, data, true).await?;
                let entry = OpenEntry {
                    target: Reference::Immutable(
                        mount.store_node(&Node::File(file.clone()), &key).await?,
                    ),
                    key,
                    writer: None,
                    metadata: Metadata::new(NodeKind::File, file.size, now),
                };
                cursor
                    .top
                    .dir
                    .insert(name.to_string(), entry.seal(&cursor.top.key)?);
                ascend(mount, cursor, now).await?
            }
            TreeEdit::Write {
                path,
                offset,
                data,
                truncate,
            } => write(mount, root_dir, root_key, path, Some(*offset), data, *truncate, now).await?,
            TreeEdit::Append { path, data } => {
                write(mount, root_dir, root_key, path, None, data, false, now).await?
            }
            TreeEdit::Link {
                path,
                child,
                replace,
            } => link(mount, root_dir, root_key, path, child, *replace, now).await?,
            TreeEdit::Unlink { path } => unlink(mount, root_dir, root_key, path, now).await?.0,
            TreeEdit::Rename { from, to } => {
                if is_prefix(from, to) {
                    return Err(FsError::MoveIntoSelf {
                        from: join(from),
                        to: join(to),
                    });
                }
                let (dir, mut moved) = unlink(mount, root_dir, root_key, from, now).await?;
                moved.metadata = moved.metadata.touched(moved.metadata.size, now);
                link(mount, dir, root_key, to, &moved, false, now).await?
            }
            TreeEdit::Rekey { path, key } => {
                let (parent, name) = split_last(path)?;
                let mut cursor = descend(mount, root_dir, root_key, parent, false, now).await?;
                let mut entry = open_child(&cursor.top, name, path)?;
                entry.key = key.clone();
                cursor
                    .top
                    .dir
                    .insert(name.to_string(), entry.seal(&cursor.top.key)?);
                ascend(mount, cursor, now).await?
            }
        };

        Ok(Node::Dir(dir))
    }
}

fn open_child(frame: &Frame, name: &str, path: &[String]) -> Result<OpenEntry, FsError> {
    let sealed = frame
        .dir
        .get(name)
        .ok_or_else(|| FsError::PathNotFound(join(path)))?;
    sealed
        .open(&frame.key)
        .map_err(|_| FsError::Unauthorized(join(path)))
}

async fn descend(
    mount: &Mount<'_>,
    root: DirNode,
    root_key: &Secret,
    path: &[String],
    create: bool,
    now: i64,
) -> Result<Cursor, FsError> {
    let mut cursor = Cursor {
        ancestors: Vec::with_capacity(path.len()),
        top: Frame {
            name: String::new(),
            dir: root,
            key: root_key.clone(),
            metadata: Metadata::new(NodeKind::Dir, 0, now),
        },
    };

    for (depth, name) in path.iter().enumerate() {
        let consumed = &path[..=depth];
        let next = if cursor.top.dir.get(name).is_some() {
            let entry = open_child(&cursor.top, name, consumed)?;
            if !entry.metadata.is_dir() {
                return Err(FsError::PathNotDir(join(consumed)));
            }
            // separately published subtrees are edited through their own pointer
            let Reference::Immutable(hash) = entry.target else {
                return Err(FsError::Unauthorized(join(consumed)));
            };
            let Node::Dir(dir) = mount.load_node(&hash, &entry.key).await? else {
                return Err(FsError::PathNotDir(join(consumed)));
            };
            Frame {
                name: name.clone(),
                dir,
                key: entry.key,
                metadata: entry.metadata,
            }
        } else if create {
            Frame {
                name: name.clone(),
                dir: DirNode::default(),
                key: mount.fresh_key(),
                metadata: Metadata::new(NodeKind::Dir, 0, now),
            }
        } else {
            return Err(FsError::PathNotFound(join(consumed)));
        };
        let parent = std::mem::replace(&mut cursor.top, next);
        cursor.ancestors.push(parent);
    }

    Ok(cursor)
}

/// Store the changed directories bottom-up, returning the new root
async fn ascend(mount: &Mount<'_>, cursor: Cursor, now: i64) -> Result<DirNode, FsError> {
    let Cursor {
        mut ancestors,
        top: mut child,
    } = cursor;

    while let Some(mut parent) = ancestors.pop() {
        let size = child.dir.len() as u64;
        let hash = mount.store_node(&Node::Dir(child.dir), &child.key).await?;
        let entry = OpenEntry {
            target: Reference::Immutable(hash),
            key: child.key,
            writer: None,
            metadata: child.metadata.touched(size, now),
        };
        parent.dir.insert(child.name, entry.seal(&parent.key)?);
        child = parent;
    }

    Ok(child.dir)
}

#[allow(clippy::too_many_arguments)]
async fn write(
    mount: &Mount<'_>,
    root: DirNode,
    root_key: &Secret,
    path: &[String],
    offset: Option<u64>,
    data: &[u8],
    truncate: bool,
    now: i64,
) -> Result<DirNode, FsError> {
    let (parent, name) = split_last(path)?;
    let mut cursor = descend(mount, root, root_key, parent, true, now).await?;

    let (file, key, metadata) = if cursor.top.dir.get(name).is_some() {
        let entry = open_child(&cursor.top, name, path)?;
        if entry.metadata.is_dir() {
            return Err(FsError::NotAFile(join(path)));
        }
        let Reference::Immutable(hash) = entry.target else {
            return Err(FsError::Unauthorized(join(path)));
        };
        let Node::File(file) = mount.load_node(&hash, &entry.key).await? else {
            return Err(FsError::NotAFile(join(path)));
        };
        (file, entry.key, entry.metadata)
    } else {
        (
            FileNode::empty(mount.config.chunk_size),
            mount.fresh_key(),
            Metadata::new(NodeKind::File, 0, now),
        )
    };

    let offset = offset.unwrap_or(file.size);
    let file = mount.write_file(&file, &key, offset, data, truncate).await?;
    let entry = OpenEntry {
        target: Reference::Immutable(mount.store_node(&Node::File(file.clone()), &key).await?),
        key,
        writer: None,
        metadata: metadata.touched(file.size, now),
    };
    cursor
        .top
        .dir
        .insert(name.to_string(), entry.seal(&cursor.top.key)?);
    ascend(mount, cursor, now).await
}

async fn link(
    mount: &Mount<'_>,
    root: DirNode,
    root_key: &Secret,
    path: &[String],
    child: &OpenEntry,
    replace: bool,
    now: i64,
) -> Result<DirNode, FsError> {
    let (parent, name) = split_last(path)?;
    let mut cursor = descend(mount, root, root_key, parent, true, now).await?;
    if !replace && cursor.top.dir.get(name).is_some() {
        return Err(FsError::PathAlreadyExists(join(path)));
    }
    cursor
        .top
        .dir
        .insert(name.to_string(), child.seal(&cursor.top.key)?);
    ascend(mount, cursor, now).await
}

async fn unlink(
    mount: &Mount<'_>,
    root: DirNode,
    root_key: &Secret,
    path: &[String],
    now: i64,
) -> Result<(DirNode, OpenEntry), FsError> {
    let (parent, name) = split_last(path)?;
    let mut cursor = descend(mount, root, root_key, parent, false, now).await?;
    let removed = open_child(&cursor.top, name, path)?;
    cursor.top.dir.remove(name);
    Ok((ascend(mount, cursor, now).await?, removed))
}
