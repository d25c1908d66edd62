//! Cryptographic primitives for capfs
//!
//! - **Identity & Authorship**: Ed25519 keypairs. Users sign with one;
//!   every independently published subtree has its own writer keypair.
//! - **Encryption**: ChaCha20-Poly1305 `Secret`s, one per node, chunk or
//!   message.
//! - **Key wrapping**: a child key is wrapped (AES-KW) under the key of
//!   whatever references it, so a directory key unlocks its descendants.
//! - **Sealing**: `SecretShare` seals a secret to a public key via
//!   X25519 ECDH + AES-KW.
//! - **Randomness**: `Entropy` is injected wherever keys or nonces are
//!   drawn.

mod entropy;
mod keys;
mod secret;
mod secret_share;

pub use ed25519_dalek::Signature;
pub use entropy::Entropy;
pub use keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
pub use secret::{Secret, SecretError, WrappedKey, SECRET_SIZE};
pub use secret_share::{SecretShare, SecretShareError};
