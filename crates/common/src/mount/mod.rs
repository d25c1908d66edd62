//! Encrypted Merkle file trees
//!
//! - **[`Node`]**: directory and file nodes, encrypted and
//!   content-addressed
//! - **[`Manifest`]**: the plaintext block a pointer names, chaining the
//!   versions of one subtree
//! - **[`Capability`]**: a key plus a [`Reference`], all it takes to read
//!   a subtree
//! - **[`TreeEdit`]** and [`Change`]: deltas committed against the
//!   current version of a [`Scope`]
//!
//! # Layout
//!
//! ```text
//! pointer (owner, writer) --> Manifest (plaintext)
//!                               |  root, previous, height, owner_share
//!                               v
//!                          Root Dir (encrypted under the root key)
//!                               |
//!              +----------------+-----------------+
//!              |                                  |
//!        Dir (inline, key                 Pointer entry (key +
//!        wrapped in parent)               writer key wrapped in parent)
//!              |                                  |
//!        File (chunk keys                 another pointer, another
//!        wrapped in file key)             manifest chain
//! ```
//!
//! A user's home tree is the scope published at `(owner, owner)`.
//!  Anything shared is promoted into its own scope with its own writer
//!  key, so its capability survives edits to the rest of the tree and
//!  revoking it only means rotating that scope's root key.

mod capability;
mod commit;
mod edit;
mod io;
mod manifest;
mod node;
pub mod path;

pub use capability::{Capability, EntryPoint, EntryPoints, Reference};
pub use commit::{Change, Scope, Version};
pub use edit::TreeEdit;
pub use manifest::Manifest;
pub use node::{ChunkRef, DirEntry, DirNode, FileNode, Metadata, Node, NodeKind, OpenEntry};

pub(crate) use io::Mount;
