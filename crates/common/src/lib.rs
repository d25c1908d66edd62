/**
 * Client entry point: sign up, log in.
 */
pub mod client;
/**
 * Retry and timeout tuning.
 */
pub mod config;
/**
 * Cryptographic types and operations.
 *  - Signing keys for users and subtree writers
 *  - Symmetric secrets, key wrapping
 *  - Sealing secrets to a public key
 *  - Injected randomness
 */
pub mod crypto;
pub mod error;
/**
 * Content hashes and the DAG-CBOR block codec.
 */
pub mod linked_data;
/**
 * Encrypted Merkle file trees: nodes, manifests,
 *  capabilities, and the edits committed against them.
 */
pub mod mount;
pub mod network;
/**
 * Signed compare-and-swap pointers, the only
 *  mutable state in the system.
 */
pub mod pointer;
mod retry;
/**
 * A logged-in user's path-addressed view, with
 *  sharing and following.
 */
pub mod session;
/**
 * Follow request messages.
 */
pub mod social;
/**
 * Contracts of the external services, and the
 *  in-process implementations of them.
 */
pub mod store;
pub mod testkit;

pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::Config;
    pub use crate::crypto::{Entropy, PublicKey, Secret, SecretKey};
    pub use crate::error::FsError;
    pub use crate::linked_data::{ContentHash, PublicKeyHash};
    pub use crate::mount::{Capability, EntryPoint, Reference};
    pub use crate::network::Network;
    pub use crate::session::{FileInfo, Session};
    pub use crate::social::{FollowOutcome, FollowRequest};
}
